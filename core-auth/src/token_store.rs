//! Credential Persistence
//!
//! Persists the [`Credential`] as a single JSON document in a [`SecureStore`]
//! under one key (`token.json` by default). With the desktop file store this
//! is a plain owner-only `token.json` file that the user can inspect or
//! delete; with the keyring store it lives in the OS keychain.
//!
//! Tokens are never logged or included in error messages.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::CredentialStore;
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store, "token.json");
//!
//! if let Some(credential) = store.load().await? {
//!     store.save(&credential).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::Credential;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default key of the persisted credential.
pub const DEFAULT_CREDENTIAL_KEY: &str = "token.json";

#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted credential.
    ///
    /// Returns `Ok(None)` when nothing is stored and
    /// [`AuthError::TokenCorrupted`] when the stored bytes do not parse.
    pub async fn load(&self) -> Result<Option<Credential>> {
        let data = self
            .secure_store
            .get_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to read persisted credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        let Some(data) = data else {
            debug!(key = %self.key, "No persisted credential");
            return Ok(None);
        };

        let credential: Credential = serde_json::from_slice(&data).map_err(|e| {
            warn!(key = %self.key, error = %e, "Persisted credential is corrupted");
            AuthError::TokenCorrupted(e.to_string())
        })?;

        debug!(
            key = %self.key,
            expiry = %credential.expiry,
            has_refresh_token = credential.has_refresh_token(),
            "Loaded persisted credential"
        );
        Ok(Some(credential))
    }

    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_vec_pretty(credential)
            .map_err(|e| AuthError::SerializationFailed(e.to_string()))?;

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to persist credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            key = %self.key,
            expiry = %credential.expiry,
            has_refresh_token = credential.has_refresh_token(),
            "Credential persisted"
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
        info!(key = %self.key, "Persisted credential removed");
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool> {
        self.secure_store
            .has_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("key", &self.key)
            .finish()
    }
}
