//! Batch runner
//!
//! Transfers a selection snapshot one entry at a time. A rejected credential
//! is renewed once per entry and that entry retried once. Other failures are
//! recorded and the batch moves on.

use core_auth::{Credential, CredentialProvider};
use core_runtime::events::TransferEvent;
use provider_google_drive::CatalogEntry;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::engine::{TransferCounter, TransferEngine};
use crate::error::{Result, TransferError};
use crate::progress::{ProgressSink, TransferProgress};

/// Result for one entry of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
    pub entry: CatalogEntry,
    pub result: Result<PathBuf>,
}

impl EntryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: String,
    pub outcomes: Vec<EntryOutcome>,
}

/// Counts for logging and the completion event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            outcomes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_ok())
    }

    /// Entries that failed for a reason other than cancellation.
    pub fn failed(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(&outcome.result, Err(e) if !e.is_cancelled()))
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(&outcome.result, Err(e) if e.is_cancelled()))
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.succeeded().count(),
            failed: self.failed().count(),
            cancelled: self.cancelled().count(),
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(EntryOutcome::is_success)
    }
}

pub struct TransferBatch {
    engine: Arc<TransferEngine>,
    credentials: Arc<dyn CredentialProvider>,
}

impl TransferBatch {
    pub fn new(engine: Arc<TransferEngine>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            engine,
            credentials,
        }
    }

    /// Transfer `entries` into `destination_dir`, in order.
    ///
    /// Duplicate `remote_id`s after the first are skipped. Once `cancel`
    /// fires, the entries not yet started are reported as cancelled.
    #[instrument(skip_all, fields(entries = entries.len(), dir = ?destination_dir))]
    pub async fn run(
        &self,
        entries: Vec<CatalogEntry>,
        destination_dir: &Path,
        observer: &ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut seen = HashSet::new();
        let entries: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.remote_id.clone()))
            .collect();

        let mut report = BatchReport::empty();
        info!(batch_id = %report.batch_id, "Starting transfer batch");
        self.engine.emit(TransferEvent::BatchStarted {
            batch_id: report.batch_id.clone(),
            entries: entries.len(),
        });

        for entry in &entries {
            observer.emit(TransferProgress::pending(entry));
        }

        // Set once the credential provider itself gives up; later entries are
        // not worth another prompt.
        let mut auth_failure: Option<TransferError> = None;

        for entry in entries {
            let mut counter = TransferCounter::default();
            let result = if cancel.is_cancelled() {
                Err(TransferError::Cancelled)
            } else if let Some(error) = &auth_failure {
                Err(error.clone())
            } else {
                self.transfer_with_renewal(&entry, destination_dir, observer, cancel, &mut counter, &mut auth_failure)
                    .await
            };

            self.engine.report_outcome(&entry, &result, &counter, observer);
            report.outcomes.push(EntryOutcome { entry, result });
        }

        let summary = report.summary();
        info!(
            batch_id = %report.batch_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Transfer batch finished"
        );
        self.engine.emit(TransferEvent::BatchCompleted {
            batch_id: report.batch_id.clone(),
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        });

        report
    }

    async fn transfer_with_renewal(
        &self,
        entry: &CatalogEntry,
        destination_dir: &Path,
        observer: &ProgressSink,
        cancel: &CancellationToken,
        counter: &mut TransferCounter,
        auth_failure: &mut Option<TransferError>,
    ) -> Result<PathBuf> {
        let credential = match self.credentials.current().await {
            Ok(credential) => credential,
            Err(e) => return Err(Self::give_up(e, auth_failure)),
        };

        let first = self
            .attempt(&credential, entry, destination_dir, observer, cancel, counter)
            .await;
        match first {
            Err(e) if e.is_unauthorized() => {
                warn!(remote_id = %entry.remote_id, error = %e, "Credential rejected, renewing once");
            }
            other => return other,
        }

        let renewed = match self.credentials.renew().await {
            Ok(credential) => credential,
            Err(e) => return Err(Self::give_up(e, auth_failure)),
        };

        *counter = TransferCounter::default();
        self.attempt(&renewed, entry, destination_dir, observer, cancel, counter)
            .await
    }

    async fn attempt(
        &self,
        credential: &Credential,
        entry: &CatalogEntry,
        destination_dir: &Path,
        observer: &ProgressSink,
        cancel: &CancellationToken,
        counter: &mut TransferCounter,
    ) -> Result<PathBuf> {
        self.engine
            .attempt(credential, entry, destination_dir, observer, cancel, counter)
            .await
    }

    fn give_up(error: core_auth::AuthError, auth_failure: &mut Option<TransferError>) -> TransferError {
        warn!(error = %error, "Could not obtain a credential for the batch");
        let failure = TransferError::Unauthorized(error.to_string());
        *auth_failure = Some(failure.clone());
        failure
    }
}

impl std::fmt::Debug for TransferBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBatch")
            .field("engine", &self.engine)
            .finish()
    }
}
