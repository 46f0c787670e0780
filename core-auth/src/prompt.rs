//! Consent prompt and interactive authorization
//!
//! [`InteractiveAuthorizer`] is the seam the Auth Flow Controller calls when
//! it needs a brand-new grant. [`LoopbackAuthorizer`] is the desktop flow:
//! bind a loopback listener, show the consent URL through an
//! [`AuthorizationPrompt`], wait for the redirect and exchange the code.

use crate::callback::LoopbackListener;
use crate::error::Result;
use crate::oauth::OAuthFlowManager;
use crate::types::TokenGrant;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Shows the consent URL to the user.
pub trait AuthorizationPrompt: Send + Sync {
    fn present(&self, auth_url: &str) -> Result<()>;
}

/// Opens the consent URL in the system browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserPrompt;

impl AuthorizationPrompt for BrowserPrompt {
    fn present(&self, auth_url: &str) -> Result<()> {
        match open::that(auth_url) {
            Ok(()) => info!("Opened consent page in the system browser"),
            Err(e) => {
                // The listener keeps waiting, so the user can still open it by hand
                warn!(error = %e, url = %auth_url, "Could not open a browser; open the URL manually");
            }
        }
        Ok(())
    }
}

/// Produces a fresh grant through user interaction.
#[async_trait]
pub trait InteractiveAuthorizer: Send + Sync {
    async fn authorize(&self, oauth: &OAuthFlowManager, timeout: Duration) -> Result<TokenGrant>;
}

/// Installed-app flow over a `127.0.0.1` redirect.
pub struct LoopbackAuthorizer {
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl LoopbackAuthorizer {
    pub fn new(prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        Self { prompt }
    }

    pub fn with_browser() -> Self {
        Self::new(Arc::new(BrowserPrompt))
    }
}

#[async_trait]
impl InteractiveAuthorizer for LoopbackAuthorizer {
    #[instrument(skip(self, oauth))]
    async fn authorize(&self, oauth: &OAuthFlowManager, timeout: Duration) -> Result<TokenGrant> {
        let listener = LoopbackListener::bind()?;
        let redirect_uri = listener.redirect_uri();

        let (auth_url, verifier) = oauth.build_auth_url(&redirect_uri)?;
        self.prompt.present(&auth_url)?;

        let callback = listener
            .wait_for_code(verifier.state().to_string(), timeout)
            .await?;

        oauth
            .exchange_code(&callback.code, &callback.state, &verifier, &redirect_uri)
            .await
    }
}
