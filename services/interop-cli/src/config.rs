//! Configuration types and loading
//!
//! Config path precedence: `--config` > `INTEROP_CONFIG` env var >
//! `interop.toml`. The private key comes from `INTEROP_PRIVATE_KEY` (PEM
//! text) when set, otherwise from the profile's `private_key_path`, so key
//! material never has to live in the TOML itself. The environment is read
//! once at startup and handed to [`Config::profile`] as an override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use interop_auth::{Environment, EnvironmentProfile, Secret, TransportConfig};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub test: Option<ProfileConfig>,
    #[serde(default)]
    pub production: Option<ProfileConfig>,
}

/// Client registration for one environment
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub key_id: String,
    pub issuer: String,
    pub client_id: String,
    pub purpose_id: String,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Overrides the environment's token endpoint URL
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

/// HTTP transport settings
#[derive(Debug, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.test.is_none() && config.production.is_none() {
            return Err(Error::Config(
                "no environment configured: add a [test] or [production] table".into(),
            ));
        }

        if config.transport.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        if config.transport.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }

        for (name, profile) in [("test", &config.test), ("production", &config.production)] {
            if let Some(profile) = profile {
                profile.validate(name)?;
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or INTEROP_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("INTEROP_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("interop.toml")
    }

    /// PEM key text from `INTEROP_PRIVATE_KEY`, if set.
    pub fn private_key_from_env() -> Option<String> {
        std::env::var("INTEROP_PRIVATE_KEY").ok()
    }

    /// Build the profile for `environment`.
    ///
    /// `private_key_override` wins over the profile's `private_key_path`.
    pub fn profile(
        &self,
        environment: Environment,
        private_key_override: Option<String>,
    ) -> Result<EnvironmentProfile> {
        let section = match environment {
            Environment::Test => self.test.as_ref(),
            Environment::Production => self.production.as_ref(),
        }
        .ok_or_else(|| {
            Error::Config(format!("environment {environment} is not configured"))
        })?;

        let private_key = if let Some(pem) = private_key_override {
            pem
        } else if let Some(ref key_path) = section.private_key_path {
            std::fs::read_to_string(key_path).map_err(|e| {
                Error::Config(format!(
                    "failed to read private_key_path {}: {e}",
                    key_path.display()
                ))
            })?
        } else {
            return Err(Error::Config(format!(
                "[{environment}] has no private_key_path and INTEROP_PRIVATE_KEY is not set"
            )));
        };

        Ok(EnvironmentProfile {
            environment,
            key_id: section.key_id.clone(),
            issuer: section.issuer.clone(),
            client_id: section.client_id.clone(),
            purpose_id: section.purpose_id.clone(),
            private_key: Secret::new(private_key),
            token_endpoint: section.token_endpoint.clone(),
        })
    }

    pub fn transport(&self, verify_tls: bool) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.transport.timeout_secs),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            accept_invalid_certs: !verify_tls,
        }
    }
}

impl ProfileConfig {
    fn validate(&self, name: &str) -> Result<()> {
        for (field, value) in [
            ("key_id", &self.key_id),
            ("issuer", &self.issuer),
            ("client_id", &self.client_id),
            ("purpose_id", &self.purpose_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("[{name}] {field} must not be empty")));
            }
        }

        if let Some(ref url) = self.token_endpoint {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "[{name}] token_endpoint must start with http:// or https://, got: {url}"
                )));
            }
        }

        Ok(())
    }
}
