//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for local file I/O and secure credential
//! storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWrite;

use crate::error::Result;

/// File system access trait
///
/// Abstracts the file operations needed to stage a download next to its
/// destination and publish it with a single rename.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn publish(fs: &dyn FileSystemAccess, staged: &Path, target: &Path) -> Result<()> {
///     fs.rename(staged, target).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List the entries of a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming writes, truncating it if present
    async fn open_write_stream(&self, path: &Path) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Move `from` to `to`, replacing `to` if it exists.
    ///
    /// Both paths must live on the same volume; implementations must make the
    /// replacement atomic with respect to readers of `to`.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Secure credential storage trait
///
/// Abstracts where the persisted credential lives:
/// - Desktop default: an owner-only JSON file next to the application data
/// - Desktop optional: the OS keychain
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Restrict access to the current user where the platform allows it
/// - Replace values atomically so a crash never leaves a truncated secret
/// - Never log or expose sensitive data
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("token.json", token.as_bytes()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// List all secret keys (without values)
    async fn list_keys(&self) -> Result<Vec<String>>;
}
