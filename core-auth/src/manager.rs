//! # Auth Flow Controller
//!
//! Produces a usable [`Credential`] on demand:
//!
//! 1. A valid credential already in memory is returned with no I/O at all.
//! 2. Otherwise the persisted credential is loaded.
//! 3. Expired with a refresh token: one silent refresh. A rejected refresh
//!    token falls back to the interactive flow.
//! 4. Absent, corrupted, or expired without a refresh token: the interactive
//!    flow runs, bounded by the configured timeout.
//!
//! Every successful acquisition or refresh is persisted exactly once before it
//! is returned. The persisted credential is written nowhere else.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthFlowController, CredentialStore, LoopbackAuthorizer, OAuthFlowManager};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::SystemClock;
//! # async fn example(store: CredentialStore, oauth: OAuthFlowManager) -> core_auth::Result<()> {
//! let controller = AuthFlowController::new(
//!     store,
//!     oauth,
//!     Arc::new(LoopbackAuthorizer::with_browser()),
//!     Arc::new(SystemClock),
//!     EventBus::new(100),
//! );
//!
//! let credential = controller.obtain_credential().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::prompt::InteractiveAuthorizer;
use crate::token_store::CredentialStore;
use crate::types::{Credential, CredentialState};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default bound on the interactive step (5 minutes)
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Source of credentials for components that call the remote API.
///
/// `renew` is the single refresh a caller performs after the server rejected
/// a credential that looked valid locally.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn current(&self) -> Result<Credential>;
    async fn renew(&self) -> Result<Credential>;
}

pub struct AuthFlowController {
    store: CredentialStore,
    oauth: OAuthFlowManager,
    authorizer: Arc<dyn InteractiveAuthorizer>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    auth_timeout: Duration,
    /// Serializes acquisition and refresh; holds the credential on hand.
    cached: Mutex<Option<Credential>>,
}

impl AuthFlowController {
    pub fn new(
        store: CredentialStore,
        oauth: OAuthFlowManager,
        authorizer: Arc<dyn InteractiveAuthorizer>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            oauth,
            authorizer,
            clock,
            event_bus,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            cached: Mutex::new(None),
        }
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    /// Return a credential that is valid right now.
    #[instrument(skip(self))]
    pub async fn obtain_credential(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.state_at(self.clock.now()) == CredentialState::Valid {
                return Ok(credential.clone());
            }
        }

        let current = match cached.clone() {
            Some(credential) => Some(credential),
            None => self.load_persisted().await?,
        };

        let credential = match current {
            Some(credential) => match credential.state_at(self.clock.now()) {
                CredentialState::Valid => {
                    debug!("Persisted credential is still valid");
                    *cached = Some(credential.clone());
                    return Ok(credential);
                }
                CredentialState::Refreshable => self.refresh_or_authorize(&credential).await?,
                CredentialState::Invalid => {
                    info!("Persisted credential expired without a refresh token");
                    self.authorize_interactively().await?
                }
            },
            None => self.authorize_interactively().await?,
        };

        self.persist(&credential).await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Refresh the credential on hand even though it looks valid locally.
    ///
    /// Without a refresh token the interactive flow runs instead.
    #[instrument(skip(self))]
    pub async fn renew(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;

        let current = match cached.clone() {
            Some(credential) => Some(credential),
            None => self.load_persisted().await?,
        };

        let credential = match current {
            Some(credential) if credential.has_refresh_token() => {
                self.refresh_or_authorize(&credential).await?
            }
            _ => self.authorize_interactively().await?,
        };

        self.persist(&credential).await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Run the interactive flow unconditionally and persist the result.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;
        let credential = self.authorize_interactively().await?;
        self.persist(&credential).await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Forget the credential in memory and on disk.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        self.store.clear().await?;
        self.emit(AuthEvent::SignedOut);
        info!("Signed out");
        Ok(())
    }

    /// Whether a credential is on hand or persisted. Never touches the network.
    pub async fn is_signed_in(&self) -> Result<bool> {
        if self.cached.lock().await.is_some() {
            return Ok(true);
        }
        self.store.exists().await
    }

    async fn load_persisted(&self) -> Result<Option<Credential>> {
        match self.store.load().await {
            Ok(credential) => Ok(credential),
            Err(AuthError::TokenCorrupted(reason)) => {
                warn!(reason = %reason, "Ignoring corrupted credential; authorization required");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_or_authorize(&self, credential: &Credential) -> Result<Credential> {
        match self.refresh(credential).await {
            Err(AuthError::RefreshRejected(reason)) => {
                warn!(reason = %reason, "Refresh token rejected; falling back to interactive authorization");
                self.authorize_interactively().await
            }
            other => other,
        }
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NoRefreshToken)?;

        self.emit(AuthEvent::TokenRefreshing);

        let grant = self
            .oauth
            .refresh_access_token(refresh_token)
            .await
            .map_err(|e| self.report(e))?;

        let mut refreshed =
            Credential::from_grant(grant, credential.refresh_token.clone(), self.clock.now());
        if refreshed.scopes.is_empty() {
            refreshed.scopes = credential.scopes.clone();
        }

        info!(expiry = %refreshed.expiry, "Credential refreshed");
        self.emit(AuthEvent::TokenRefreshed {
            expires_at: refreshed.expiry.timestamp(),
        });
        Ok(refreshed)
    }

    async fn authorize_interactively(&self) -> Result<Credential> {
        info!(
            timeout_secs = self.auth_timeout.as_secs(),
            "Starting interactive authorization"
        );
        self.emit(AuthEvent::SigningIn);

        let grant = self
            .authorizer
            .authorize(&self.oauth, self.auth_timeout)
            .await
            .map_err(|e| self.report(e))?;

        let mut credential = Credential::from_grant(grant, None, self.clock.now());
        if credential.scopes.is_empty() {
            credential.scopes = self.oauth.config().scopes.clone();
        }

        self.emit(AuthEvent::SignedIn {
            expires_at: credential.expiry.timestamp(),
        });
        Ok(credential)
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        self.store.save(credential).await.map_err(|e| self.report(e))
    }

    fn report(&self, error: AuthError) -> AuthError {
        self.emit(AuthEvent::AuthError {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
        error
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

#[async_trait]
impl CredentialProvider for AuthFlowController {
    async fn current(&self) -> Result<Credential> {
        self.obtain_credential().await
    }

    async fn renew(&self) -> Result<Credential> {
        AuthFlowController::renew(self).await
    }
}

impl std::fmt::Debug for AuthFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlowController")
            .field("store", &self.store)
            .field("auth_timeout", &self.auth_timeout)
            .finish()
    }
}
