//! File-backed secret storage
//!
//! Each secret is one file under a root directory, named after its key. This
//! keeps the persisted credential a plain JSON document (`token.json`) that the
//! user can inspect or delete, while writes stay atomic and owner-only.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Secret store writing one file per key.
#[derive(Debug, Clone)]
pub struct FileSecureStore {
    root: PathBuf,
}

impl FileSecureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(['/', '\\', '\0'])
            && key != "..";
        if !valid {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid secret key: {:?}",
                key
            )));
        }
        Ok(self.root.join(key))
    }

    #[cfg(unix)]
    async fn restrict_permissions(file: &fs::File) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(BridgeError::Io)
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(_file: &fs::File) -> Result<()> {
        Ok(())
    }

    async fn write_staged(&self, staged: &Path, value: &[u8]) -> Result<()> {
        let mut file = fs::File::create(staged).await?;
        Self::restrict_permissions(&file).await?;
        file.write_all(value).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let target = self.path_for(key)?;
        fs::create_dir_all(&self.root).await?;

        let staged = self.root.join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));
        if let Err(e) = self.write_staged(&staged, value).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&staged, &target).await {
            warn!(key = key, error = %e, "Failed to publish secret file");
            let _ = fs::remove_file(&staged).await;
            return Err(BridgeError::Io(e));
        }

        debug!(key = key, "Stored secret file");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!(key = key, "Read secret file");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = key, "Deleted secret file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
