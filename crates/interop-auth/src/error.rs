//! Error types for the client-assertion credential lifecycle

/// Errors from assertion signing, token exchange, authorized calls and the
/// token cache.
///
/// The core never retries and never recovers from these, with one exception:
/// a lenient [`TokenCache`](crate::TokenCache) degrades `CacheRead` to an
/// empty cache instead of returning it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid environment {0:?}: expected \"test\" or \"production\"")]
    InvalidEnvironment(String),

    #[error("token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request failed: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("cache read error: {0}")]
    CacheRead(String),

    #[error("cache write error: {0}")]
    CacheWrite(String),
}

/// Result alias for credential lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
