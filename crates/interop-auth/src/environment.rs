//! Interoperability platform environments
//!
//! Exactly two environments are recognized. Each one fixes the token
//! endpoint the assertion is exchanged at and the audience the assertion is
//! minted for; the two values always come from the same environment.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::secret::Secret;

/// Token endpoint of the test (UAT) environment
pub const TEST_TOKEN_ENDPOINT: &str = "https://auth.uat.interop.pagopa.it/token.oauth2";

/// Client-assertion audience of the test (UAT) environment
pub const TEST_AUDIENCE: &str = "auth.uat.interop.pagopa.it/client-assertion";

/// Token endpoint of the production environment
pub const PRODUCTION_TOKEN_ENDPOINT: &str = "https://auth.interop.pagopa.it/token.oauth2";

/// Client-assertion audience of the production environment
pub const PRODUCTION_AUDIENCE: &str = "auth.interop.pagopa.it/client-assertion";

/// A recognized platform environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Test,
    Production,
}

/// Endpoint/audience pair resolved from an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub token_endpoint: &'static str,
    pub audience: &'static str,
}

impl Environment {
    pub fn endpoints(self) -> Endpoints {
        match self {
            Environment::Test => Endpoints {
                token_endpoint: TEST_TOKEN_ENDPOINT,
                audience: TEST_AUDIENCE,
            },
            Environment::Production => Endpoints {
                token_endpoint: PRODUCTION_TOKEN_ENDPOINT,
                audience: PRODUCTION_AUDIENCE,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    /// Unrecognized names are rejected; there is no default environment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => Err(Error::InvalidEnvironment(other.to_owned())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the credential lifecycle needs to know about the caller for
/// one environment. Built once at startup and not modified afterwards.
#[derive(Debug, Clone)]
pub struct EnvironmentProfile {
    pub environment: Environment,
    /// `kid` header of the client assertion
    pub key_id: String,
    pub issuer: String,
    pub client_id: String,
    pub purpose_id: String,
    /// PKCS8 PEM private key
    pub private_key: Secret<String>,
    /// Overrides the URL the assertion is posted to. The audience is not
    /// affected.
    pub token_endpoint: Option<String>,
}

impl EnvironmentProfile {
    /// URL the assertion is exchanged at.
    pub fn token_endpoint(&self) -> &str {
        self.token_endpoint
            .as_deref()
            .unwrap_or(self.environment.endpoints().token_endpoint)
    }
}
