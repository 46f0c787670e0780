//! Secure Credential Storage using the OS keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, error};

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// The keychain cannot enumerate entries, so keys written through this
/// instance are tracked in memory for `list_keys`.
pub struct KeyringSecureStore {
    service_name: String,
    known_keys: Mutex<BTreeSet<String>>,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(crate::APP_DIR_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            known_keys: Mutex::new(BTreeSet::new()),
        }
    }

    fn get_entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }

    fn remember(&self, key: &str, present: bool) {
        if let Ok(mut keys) = self.known_keys.lock() {
            if present {
                keys.insert(key.to_string());
            } else {
                keys.remove(key);
            }
        }
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        // Keyring only stores strings
        let encoded = STANDARD.encode(value);
        self.get_entry(key)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;

        self.remember(key, true);
        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get_entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(&encoded).map_err(|e| {
                    error!(key = key, error = %e, "Failed to decode secret");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                self.remember(key, true);
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.get_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                self.remember(key, false);
                debug!(key = key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let keys = self
            .known_keys
            .lock()
            .map_err(|_| BridgeError::OperationFailed("Keyring key index poisoned".to_string()))?;
        Ok(keys.iter().cloned().collect())
    }
}
