//! Transfer progress
//!
//! Progress snapshots are pushed to an optional observer through an unbounded
//! channel. A transfer with no observer attached behaves the same.

use provider_google_drive::CatalogEntry;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    InProgress,
    Complete { path: PathBuf },
    Failed { reason: String },
    Cancelled,
}

/// Snapshot of one entry's transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub entry: CatalogEntry,
    /// `bytes_received / total_bytes` while the total is known; never guessed.
    pub fraction: Option<f64>,
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
    pub state: TransferState,
}

impl TransferProgress {
    pub fn pending(entry: &CatalogEntry) -> Self {
        Self {
            entry: entry.clone(),
            fraction: None,
            bytes_received: 0,
            total_bytes: None,
            state: TransferState::Pending,
        }
    }

    pub fn in_progress(entry: &CatalogEntry, bytes_received: u64, total_bytes: Option<u64>) -> Self {
        Self {
            entry: entry.clone(),
            fraction: fraction(bytes_received, total_bytes),
            bytes_received,
            total_bytes,
            state: TransferState::InProgress,
        }
    }

    pub fn complete(entry: &CatalogEntry, path: PathBuf, bytes_received: u64) -> Self {
        Self {
            entry: entry.clone(),
            fraction: Some(1.0),
            bytes_received,
            total_bytes: Some(bytes_received),
            state: TransferState::Complete { path },
        }
    }

    pub fn failed(
        entry: &CatalogEntry,
        reason: impl Into<String>,
        bytes_received: u64,
        total_bytes: Option<u64>,
    ) -> Self {
        Self {
            entry: entry.clone(),
            fraction: fraction(bytes_received, total_bytes),
            bytes_received,
            total_bytes,
            state: TransferState::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn cancelled(entry: &CatalogEntry, bytes_received: u64, total_bytes: Option<u64>) -> Self {
        Self {
            entry: entry.clone(),
            fraction: fraction(bytes_received, total_bytes),
            bytes_received,
            total_bytes,
            state: TransferState::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TransferState::Complete { .. } | TransferState::Failed { .. } | TransferState::Cancelled
        )
    }
}

fn fraction(bytes_received: u64, total_bytes: Option<u64>) -> Option<f64> {
    match total_bytes {
        Some(0) => Some(1.0),
        Some(total) => Some((bytes_received as f64 / total as f64).clamp(0.0, 1.0)),
        None => None,
    }
}

/// Optional observer of progress snapshots.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<TransferProgress>>,
}

impl ProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<TransferProgress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that drops every snapshot.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn emit(&self, progress: TransferProgress) {
        if let Some(sender) = &self.sender {
            // Observer went away; the transfer carries on
            let _ = sender.send(progress);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| !sender.is_closed())
    }
}
