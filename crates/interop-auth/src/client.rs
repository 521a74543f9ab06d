//! Token exchange and authorized API calls
//!
//! Two kinds of interaction with the platform:
//! 1. POST a client assertion to the token endpoint, receive an access token
//! 2. GET an API or status URL with that access token as a Bearer credential
//!
//! The active credential is not stored on the client. Callers own the
//! [`AccessToken`] and pass it to every authorized call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assertion::SignedAssertion;
use crate::error::{Error, Result};
use crate::secret::Secret;

/// IANA-registered `client_assertion_type` for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Header carrying the client id on authorized calls.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Transport settings for one [`TokenExchangeClient`].
///
/// Timeouts are always set on the underlying HTTP client so no call relies on
/// library defaults.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Skip TLS certificate verification. Applies only to the client built
    /// from this config.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }
}

/// An access token and its absolute expiry (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: Secret<String>,
    pub expires_at: u64,
}

/// Successful response body of the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. Some servers
/// send it as a float (`3600.0`), so it is read as one and floored.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: f64,
}

/// Status and body of an authorized GET, passed through uninterpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// HTTP client for the token endpoint and the authorized APIs.
#[derive(Debug)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
    client_id: String,
    insecure: bool,
    insecure_warned: AtomicBool,
}

impl TokenExchangeClient {
    pub fn new(client_id: impl Into<String>, transport: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(transport.timeout)
            .connect_timeout(transport.connect_timeout);
        if transport.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            insecure: transport.accept_invalid_certs,
            insecure_warned: AtomicBool::new(false),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Exchange a client assertion for an access token.
    ///
    /// Consumes the assertion. Non-2xx responses fail with
    /// [`Error::TokenExchange`] carrying the status and raw body.
    pub async fn exchange_assertion(
        &self,
        assertion: SignedAssertion,
        endpoint: &str,
    ) -> Result<AccessToken> {
        self.warn_if_insecure();
        debug!(endpoint, jti = %assertion.jti, "requesting access token");

        let response = self
            .http
            .post(endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_assertion", assertion.token.expose().as_str()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| Error::Network(format!("token request to {endpoint} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(endpoint, status = status.as_u16(), "token exchange rejected");
            return Err(Error::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("token response: {e}")))?;

        let expires_at = absolute_expiry(crate::unix_now(), token.expires_in)?;
        info!(expires_in = token.expires_in, expires_at, "access token obtained");

        Ok(AccessToken {
            token: Secret::new(token.access_token),
            expires_at,
        })
    }

    /// GET `url` with `filters` merged into its query string.
    ///
    /// A filter replaces the first same-named query parameter and drops any
    /// later duplicates; unknown names are appended.
    pub async fn authorized_request(
        &self,
        token: &AccessToken,
        url: &str,
        filters: &[(String, String)],
    ) -> Result<ApiResponse> {
        let mut url = parse_url(url)?;
        apply_filters(&mut url, filters);
        self.authorized_get(token, url).await
    }

    /// GET a status URL as-is.
    pub async fn status_request(&self, token: &AccessToken, url: &str) -> Result<ApiResponse> {
        let url = parse_url(url)?;
        self.authorized_get(token, url).await
    }

    async fn authorized_get(&self, token: &AccessToken, url: Url) -> Result<ApiResponse> {
        self.warn_if_insecure();
        debug!(url = %url, "authorized request");

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token.token.expose())
            .header(CLIENT_ID_HEADER, self.client_id.as_str())
            .send()
            .await
            .map_err(|e| Error::Network(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading response from {url}: {e}")))?;

        debug!(url = %url, status, bytes = bytes.len(), "authorized response");
        Ok(ApiResponse {
            status,
            body: parse_body(&bytes),
        })
    }

    /// Emits the insecure-transport warning on first use only. Returns whether
    /// it fired.
    fn warn_if_insecure(&self) -> bool {
        if self.insecure && !self.insecure_warned.swap(true, Ordering::Relaxed) {
            warn!(
                client_id = %self.client_id,
                "TLS certificate verification is DISABLED for this client; never use this against production"
            );
            return true;
        }
        false
    }
}

/// `now + expires_in`, rejecting negative, non-finite and overflowing deltas.
fn absolute_expiry(now: u64, expires_in: f64) -> Result<u64> {
    if !expires_in.is_finite() || expires_in < 0.0 || expires_in >= u64::MAX as f64 {
        return Err(Error::InvalidResponse(format!(
            "token response: expires_in {expires_in} out of range"
        )));
    }
    now.checked_add(expires_in.floor() as u64).ok_or_else(|| {
        Error::InvalidResponse(format!(
            "token response: expires_in {expires_in} overflows expiry"
        ))
    })
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))
}

fn apply_filters(url: &mut Url, filters: &[(String, String)]) {
    if filters.is_empty() {
        return;
    }

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    for (key, value) in filters {
        let mut seen = false;
        pairs.retain_mut(|(k, v)| {
            if k != key {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            *v = value.clone();
            true
        });
        if !seen {
            pairs.push((key.clone(), value.clone()));
        }
    }

    url.query_pairs_mut().clear().extend_pairs(&pairs);
}

/// Empty bodies become `null`; bodies that are not JSON are returned as a
/// JSON string.
fn parse_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
    })
}
