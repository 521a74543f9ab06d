//! JWT client-assertion authentication for interoperability platforms
//!
//! Implements the OAuth2 client-credentials grant with a self-signed JWT
//! client assertion (RFC 7523) instead of a static client secret.
//!
//! Credential flow:
//! 1. `TokenCache::load()` reads the previously saved access token, if any
//! 2. `TokenCache::valid()` decides whether it can be reused
//! 3. Otherwise `AssertionGenerator::generate()` signs a fresh assertion
//! 4. `TokenExchangeClient::exchange_assertion()` trades it for an access token
//! 5. `TokenCache::save()` optionally persists the new token
//! 6. `TokenExchangeClient::authorized_request()` / `status_request()` use it
//!
//! `session::Session` runs steps 1-5 as a small state machine and hands back
//! an `ActiveSession` for step 6.

pub mod assertion;
pub mod cache;
pub mod client;
pub mod environment;
pub mod error;
pub mod secret;
pub mod session;

pub use assertion::{
    ASSERTION_LIFETIME_SECS, AssertionClaims, AssertionGenerator, ClientClaims, Rs256Signer,
    SignedAssertion, Signer, SigningKey,
};
pub use cache::{CachedCredential, TokenCache};
pub use client::{
    AccessToken, ApiResponse, CLIENT_ASSERTION_TYPE, CLIENT_ID_HEADER, TokenExchangeClient,
    TokenResponse, TransportConfig,
};
pub use environment::*;
pub use error::{Error, Result};
pub use secret::Secret;
pub use session::{ActiveSession, Session, TokenSource};

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
