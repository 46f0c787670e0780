//! # Transfer Engine
//!
//! Fetches one catalog entry into a local directory:
//!
//! 1. Resolve the export policy to pick a raw or export request and the
//!    final name (`Report` exported as PDF becomes `Report.pdf`).
//! 2. Read the content chunk by chunk into a staging file, reporting
//!    progress after every chunk.
//! 3. Publish the staging file onto the final path with one rename once the
//!    stream is complete.
//! 4. Report a terminal state.
//!
//! The engine never retries. On any failure or cancellation the staging file
//! is removed and nothing appears at the final path.

use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::{Clock, SystemClock};
use core_auth::Credential;
use core_runtime::config::CollisionPolicy;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use core_runtime::logging::strip_path;
use provider_google_drive::{CatalogEntry, MediaRequest, MediaSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TransferError};
use crate::export_policy;
use crate::progress::{ProgressSink, TransferProgress};
use crate::staging::StagingFile;

/// Byte counts of the attempt in flight.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TransferCounter {
    pub(crate) received: u64,
    pub(crate) total: Option<u64>,
}

pub struct TransferEngine {
    media: Arc<dyn MediaSource>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    collision_policy: CollisionPolicy,
}

impl TransferEngine {
    pub fn new(media: Arc<dyn MediaSource>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            media,
            fs,
            clock: Arc::new(SystemClock),
            event_bus: None,
            collision_policy: CollisionPolicy::default(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Judge credential expiry against `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    /// Transfer `entry` into `destination_dir` and return the written path.
    ///
    /// Progress goes to `observer`; `cancel` is checked before every chunk
    /// request.
    pub async fn transfer(
        &self,
        credential: &Credential,
        entry: &CatalogEntry,
        destination_dir: &Path,
        observer: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let mut counter = TransferCounter::default();
        let result = self
            .attempt(credential, entry, destination_dir, observer, cancel, &mut counter)
            .await;
        self.report_outcome(entry, &result, &counter, observer);
        result
    }

    /// One attempt with no terminal report, so a caller can retry first.
    #[instrument(skip(self, credential, observer, cancel, counter), fields(remote_id = %entry.remote_id))]
    pub(crate) async fn attempt(
        &self,
        credential: &Credential,
        entry: &CatalogEntry,
        destination_dir: &Path,
        observer: &ProgressSink,
        cancel: &CancellationToken,
        counter: &mut TransferCounter,
    ) -> Result<PathBuf> {
        let spec = export_policy::resolve(&entry.content_type);
        let final_name = export_policy::final_name(&entry.display_name, spec.as_ref());
        let local_name = sanitize_file_name(&final_name);
        let request = match spec {
            Some(spec) => MediaRequest::Export {
                file_id: entry.remote_id.clone(),
                mime_type: spec.target_content_type.to_string(),
            },
            None => MediaRequest::Raw {
                file_id: entry.remote_id.clone(),
            },
        };

        let access_token = credential.usable_token(self.clock.now()).ok_or_else(|| {
            TransferError::Unauthorized("credential expired before the transfer".to_string())
        })?;

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        info!(file_name = %local_name, export = spec.is_some(), "Starting transfer");
        self.emit(TransferEvent::Started {
            remote_id: entry.remote_id.clone(),
            file_name: local_name.clone(),
        });

        self.fs
            .create_dir_all(destination_dir)
            .await
            .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))?;

        let mut stream = self.media.open(access_token, &request).await?;
        counter.total = stream.total_bytes();
        observer.emit(TransferProgress::in_progress(entry, 0, counter.total));

        let mut staging = StagingFile::create(self.fs.clone(), destination_dir, &local_name).await?;

        loop {
            if cancel.is_cancelled() {
                debug!(bytes = counter.received, "Transfer cancelled between chunks");
                staging.discard().await;
                return Err(TransferError::Cancelled);
            }

            let chunk = match stream.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, bytes = counter.received, "Chunk fetch failed");
                    staging.discard().await;
                    return Err(e.into());
                }
            };

            if let Err(e) = staging.write_chunk(&chunk).await {
                staging.discard().await;
                return Err(e);
            }

            counter.received += chunk.len() as u64;
            if counter.total.is_none() {
                counter.total = stream.total_bytes();
            }
            observer.emit(TransferProgress::in_progress(entry, counter.received, counter.total));
            self.emit(TransferEvent::Progress {
                remote_id: entry.remote_id.clone(),
                bytes_received: counter.received,
                total_bytes: counter.total,
            });
        }

        if let Some(total) = counter.total.filter(|total| *total != counter.received) {
            warn!(bytes = counter.received, total = total, "Stream ended at the wrong length");
            staging.discard().await;
            return Err(TransferError::NetworkInterrupted(format!(
                "received {} of {} bytes",
                counter.received, total
            )));
        }

        let destination = match self.destination_path(destination_dir, &local_name).await {
            Ok(destination) => destination,
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        };
        let path = staging.commit(&destination).await?;

        info!(
            file = strip_path(&path.to_string_lossy()),
            bytes = counter.received,
            "Transfer complete"
        );
        Ok(path)
    }

    /// Emit the terminal progress snapshot and event for `result`.
    pub(crate) fn report_outcome(
        &self,
        entry: &CatalogEntry,
        result: &Result<PathBuf>,
        counter: &TransferCounter,
        observer: &ProgressSink,
    ) {
        let remote_id = entry.remote_id.clone();
        match result {
            Ok(path) => {
                observer.emit(TransferProgress::complete(entry, path.clone(), counter.received));
                self.emit(TransferEvent::Completed {
                    remote_id,
                    path: path.clone(),
                });
            }
            Err(TransferError::Cancelled) => {
                observer.emit(TransferProgress::cancelled(entry, counter.received, counter.total));
                self.emit(TransferEvent::Cancelled { remote_id });
            }
            Err(e) => {
                warn!(remote_id = %entry.remote_id, error = %e, "Transfer failed");
                observer.emit(TransferProgress::failed(
                    entry,
                    e.to_string(),
                    counter.received,
                    counter.total,
                ));
                self.emit(TransferEvent::Failed {
                    remote_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Transfer(event));
        }
    }

    async fn destination_path(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        match self.collision_policy {
            CollisionPolicy::Overwrite => Ok(path),
            CollisionPolicy::KeepBoth => self.find_available_path(dir, file_name).await,
        }
    }

    /// `name.ext`, then `name (1).ext`, `name (2).ext`, ... until one is free.
    async fn find_available_path(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        if !self.path_exists(&path).await? {
            return Ok(path);
        }

        let (stem, extension) = match file_name.find('.') {
            Some(dot) if dot > 0 => file_name.split_at(dot),
            _ => (file_name, ""),
        };

        let mut counter = 1u32;
        loop {
            let candidate = dir.join(format!("{} ({}){}", stem, counter, extension));
            if !self.path_exists(&candidate).await? {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        self.fs
            .exists(path)
            .await
            .map_err(|e| TransferError::LocalWriteFailed(e.to_string()))
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("collision_policy", &self.collision_policy)
            .finish()
    }
}

/// Make `name` usable as a single path component.
///
/// Separators and NUL become `_`; `.`, `..` and the empty name become `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
