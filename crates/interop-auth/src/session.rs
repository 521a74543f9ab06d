//! Credential session state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! [`Session::establish`] executes the I/O implied by each action.
//!
//! ```text
//! Start --CacheLoaded--> CacheChecked
//! CacheChecked --Validate (valid)--> Active (cached token)
//! CacheChecked --Validate (expired/absent)--> NeedsExchange
//! NeedsExchange --Exchanged--> Active (fresh token, persist)
//! NeedsExchange --ExchangeFailed--> Failed
//! ```
//!
//! `Active` and `Failed` are terminal. There is no path from `Failed` back
//! to `NeedsExchange`.

use tracing::{debug, error, info};

use crate::assertion::{AssertionGenerator, ClientClaims, Rs256Signer, Signer, SigningKey};
use crate::cache::{CachedCredential, TokenCache};
use crate::client::{AccessToken, ApiResponse, TokenExchangeClient, TransportConfig};
use crate::environment::EnvironmentProfile;
use crate::error::{Error, Result};

/// Where the active token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cache,
    Exchange,
}

#[derive(Debug)]
pub enum SessionState {
    /// Nothing loaded yet
    Start,
    /// Cache read, expiry not yet checked
    CacheChecked { cached: Option<CachedCredential> },
    /// No usable cached token; an assertion must be exchanged
    NeedsExchange,
    /// Terminal: a valid token is held
    Active {
        token: AccessToken,
        source: TokenSource,
    },
    /// Terminal: signing or exchange failed
    Failed { error: Error },
}

#[derive(Debug)]
pub enum SessionEvent {
    /// Cache read finished (`None` when empty or unreadable)
    CacheLoaded(Option<CachedCredential>),
    /// Check the cached expiry against `now` (unix seconds)
    Validate { now: u64 },
    /// Fresh token received from the token endpoint
    Exchanged(AccessToken),
    /// Assertion generation or token exchange failed
    ExchangeFailed(Error),
}

/// Actions the driver should execute after a transition
#[derive(Debug, PartialEq, Eq)]
pub enum SessionAction {
    LoadCache,
    ValidateCache,
    /// Generate one assertion and exchange it
    Exchange,
    /// Write the new token to the cache if persistence is enabled
    Persist,
    /// Stop with the error held in `Failed`
    Abort,
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: SessionState, event: SessionEvent) -> (SessionState, SessionAction) {
    match (state, event) {
        (SessionState::Start, SessionEvent::CacheLoaded(cached)) => (
            SessionState::CacheChecked { cached },
            SessionAction::ValidateCache,
        ),

        (SessionState::CacheChecked { cached }, SessionEvent::Validate { now }) => {
            match cached.and_then(|c| c.into_valid_token(now)) {
                Some(token) => (
                    SessionState::Active {
                        token,
                        source: TokenSource::Cache,
                    },
                    SessionAction::None,
                ),
                None => (SessionState::NeedsExchange, SessionAction::Exchange),
            }
        }

        (SessionState::NeedsExchange, SessionEvent::Exchanged(token)) => (
            SessionState::Active {
                token,
                source: TokenSource::Exchange,
            },
            SessionAction::Persist,
        ),

        (SessionState::NeedsExchange, SessionEvent::ExchangeFailed(error)) => {
            (SessionState::Failed { error }, SessionAction::Abort)
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, SessionAction::None),
    }
}

/// Drives one invocation from cache lookup to an active credential.
pub struct Session<S = Rs256Signer> {
    profile: EnvironmentProfile,
    client: TokenExchangeClient,
    cache: TokenCache,
    generator: AssertionGenerator<S>,
    persist: bool,
}

impl Session<Rs256Signer> {
    /// Build a session whose HTTP client identifies as `profile.client_id`.
    pub fn new(
        profile: EnvironmentProfile,
        transport: &TransportConfig,
        cache: TokenCache,
    ) -> Result<Self> {
        let client = TokenExchangeClient::new(profile.client_id.clone(), transport)?;
        Ok(Self {
            profile,
            client,
            cache,
            generator: AssertionGenerator::new(),
            persist: false,
        })
    }
}

impl<S: Signer> Session<S> {
    /// Swap the assertion generator (e.g. for a different signing backend).
    pub fn with_generator<T: Signer>(self, generator: AssertionGenerator<T>) -> Session<T> {
        Session {
            profile: self.profile,
            client: self.client,
            cache: self.cache,
            generator,
            persist: self.persist,
        }
    }

    /// Write freshly exchanged tokens back to the cache.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Reuse a valid cached token or exchange a new assertion for one.
    ///
    /// Cache read errors (strict mode), signing errors, exchange errors and
    /// cache write errors all end the session.
    pub async fn establish(self) -> Result<ActiveSession> {
        let mut state = SessionState::Start;
        let mut action = SessionAction::LoadCache;

        loop {
            debug!(?action, "session action");
            let event = match action {
                SessionAction::LoadCache => SessionEvent::CacheLoaded(self.cache.load().await?),
                SessionAction::ValidateCache => SessionEvent::Validate {
                    now: crate::unix_now(),
                },
                SessionAction::Exchange => match self.exchange().await {
                    Ok(token) => SessionEvent::Exchanged(token),
                    Err(e) => SessionEvent::ExchangeFailed(e),
                },
                SessionAction::Persist => {
                    if let SessionState::Active { token, .. } = &state {
                        if self.persist {
                            self.cache.save(token).await?;
                        }
                    }
                    break;
                }
                SessionAction::Abort | SessionAction::None => break,
            };
            (state, action) = handle_event(state, event);
        }

        match state {
            SessionState::Active { token, source } => {
                info!(?source, expires_at = token.expires_at, "session active");
                Ok(ActiveSession {
                    client: self.client,
                    token,
                    source,
                })
            }
            SessionState::Failed { error } => {
                error!(error = %error, "session failed");
                Err(error)
            }
            other => unreachable!("session loop stopped in non-terminal state {other:?}"),
        }
    }

    async fn exchange(&self) -> Result<AccessToken> {
        let profile = &self.profile;
        let key = SigningKey {
            key_id: &profile.key_id,
            pem: profile.private_key.expose(),
        };
        let claims = ClientClaims {
            issuer: profile.issuer.clone(),
            client_id: profile.client_id.clone(),
            purpose_id: profile.purpose_id.clone(),
        };

        let assertion = self.generator.generate(&key, &claims, profile.environment)?;
        let endpoint = profile.token_endpoint().to_owned();
        self.client.exchange_assertion(assertion, &endpoint).await
    }
}

/// A session holding its one active credential.
#[derive(Debug)]
pub struct ActiveSession {
    client: TokenExchangeClient,
    token: AccessToken,
    source: TokenSource,
}

impl ActiveSession {
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }

    pub async fn status(&self, url: &str) -> Result<ApiResponse> {
        self.client.status_request(&self.token, url).await
    }

    pub async fn request(&self, url: &str, filters: &[(String, String)]) -> Result<ApiResponse> {
        self.client
            .authorized_request(&self.token, url, filters)
            .await
    }
}
