//! Staging file
//!
//! Content is written to a hidden `.<name>.<uuid>.part` file in the
//! destination directory and published with one `rename`, so the final path
//! only ever shows complete content. A staging file that is neither
//! committed nor discarded is removed when dropped.

use bridge_traits::storage::FileSystemAccess;
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TransferError};

/// Bytes of the final name kept in the staging name. The rest of the
/// staging name adds 39 bytes, keeping it well under `NAME_MAX`.
const STAGING_NAME_BYTES: usize = 64;

pub struct StagingFile {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    bytes_written: u64,
    armed: bool,
}

impl StagingFile {
    /// Hidden sibling path for `file_name` inside `dir`.
    pub fn staging_path(dir: &Path, file_name: &str) -> PathBuf {
        dir.join(format!(
            ".{}.{}.part",
            truncate_at_char_boundary(file_name, STAGING_NAME_BYTES),
            Uuid::new_v4().simple()
        ))
    }

    pub async fn create(fs: Arc<dyn FileSystemAccess>, dir: &Path, file_name: &str) -> Result<Self> {
        let path = Self::staging_path(dir, file_name);
        let writer = fs
            .open_write_stream(&path)
            .await
            .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))?;

        debug!(file = strip_path(&path.to_string_lossy()), "Staging file created");
        Ok(Self {
            fs,
            path,
            writer: Some(writer),
            bytes_written: 0,
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TransferError::LocalWriteFailed("staging file closed".to_string()))?;
        writer
            .write_all(chunk)
            .await
            .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, close and rename onto `destination`.
    ///
    /// On failure the staging file is removed and `destination` is untouched.
    pub async fn commit(mut self, destination: &Path) -> Result<PathBuf> {
        if let Err(e) = self.close().await {
            self.discard().await;
            return Err(e);
        }

        if let Err(e) = self.fs.rename(&self.path, destination).await {
            warn!(error = %e, "Could not publish staged file");
            self.discard().await;
            return Err(TransferError::LocalWriteFailed(e.to_string()));
        }

        self.armed = false;
        debug!(
            file = strip_path(&destination.to_string_lossy()),
            bytes = self.bytes_written,
            "Staged file published"
        );
        Ok(destination.to_path_buf())
    }

    /// Remove the staging file.
    pub async fn discard(mut self) {
        self.writer.take();
        match self.fs.delete_file(&self.path).await {
            Ok(()) => debug!(path = ?self.path, "Staging file removed"),
            Err(e) => warn!(path = ?self.path, error = %e, "Failed to remove staging file"),
        }
        // Retrying from Drop would not do better
        self.armed = false;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .await
                .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))?;
            writer
                .shutdown()
                .await
                .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.writer.take();

        let fs = Arc::clone(&self.fs);
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = fs.delete_file(&path).await {
                        warn!(path = ?path, error = %e, "Failed to clean up staging file");
                    }
                });
            }
            Err(_) => warn!(path = ?path, "No runtime to clean up staging file"),
        }
    }
}

impl std::fmt::Debug for StagingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingFile")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .field("armed", &self.armed)
            .finish()
    }
}

fn truncate_at_char_boundary(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
