//! Core service façade.
//!
//! [`DriveFetchService`] is the narrow interface a presentation layer drives:
//! sign in, list remote files, toggle a selection and run a transfer batch
//! while observing progress. It wires the bridges from [`AppConfig`] into the
//! auth, catalog and transfer components. Desktop hosts enable the
//! `desktop-shims` feature so the config fills in default bridges.

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::Credential;
pub use core_runtime::config::{AppConfig, ClientRegistration, CollisionPolicy};
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_transfer::{
    BatchReport, CancellationToken, EntryOutcome, TransferError, TransferProgress, TransferState,
};
pub use provider_google_drive::CatalogEntry;

use bridge_traits::{Clock, SystemClock};
use core_auth::{
    AuthFlowController, CredentialProvider, CredentialStore, LoopbackAuthorizer, OAuthConfig,
    OAuthFlowManager,
};
use core_transfer::{ProgressSink, SelectionSet, TransferBatch, TransferEngine};
use provider_google_drive::{ApiError, CatalogClient, DriveMediaSource};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Listing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingOptions {
    pub page_size: u32,
    pub limit: Option<usize>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            page_size: core_runtime::config::DEFAULT_PAGE_SIZE,
            limit: None,
        }
    }
}

/// Prebuilt components for [`DriveFetchService::from_parts`].
pub struct ServiceParts {
    pub auth: Arc<AuthFlowController>,
    pub catalog: CatalogClient,
    pub engine: Arc<TransferEngine>,
    pub event_bus: EventBus,
    pub listing: ListingOptions,
    pub download_dir: PathBuf,
}

/// A running transfer batch.
///
/// Progress arrives on `progress` until the batch finishes; `report` resolves
/// to the per-entry outcomes.
#[derive(Debug)]
pub struct TransferBatchHandle {
    pub progress: mpsc::UnboundedReceiver<TransferProgress>,
    pub cancel: CancellationToken,
    pub report: JoinHandle<BatchReport>,
}

impl TransferBatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct DriveFetchService {
    auth: Arc<AuthFlowController>,
    catalog: CatalogClient,
    engine: Arc<TransferEngine>,
    event_bus: EventBus,
    listing_options: ListingOptions,
    download_dir: PathBuf,
    listing: Mutex<HashMap<String, CatalogEntry>>,
    selection: Arc<Mutex<SelectionSet>>,
    batch_running: Arc<AtomicBool>,
}

impl DriveFetchService {
    /// Wire every component from `config`.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let oauth = OAuthFlowManager::new(
            OAuthConfig::from_registration(&config.registration, config.scopes.clone()),
            config.http_client.clone(),
        );
        let store = CredentialStore::new(config.secure_store.clone(), config.token_key());
        let auth = AuthFlowController::new(
            store,
            oauth,
            Arc::new(LoopbackAuthorizer::with_browser()),
            Arc::clone(&clock),
            event_bus.clone(),
        )
        .with_auth_timeout(config.auth_timeout);

        let catalog = CatalogClient::new(config.http_client.clone())
            .with_api_base(config.drive_api_base.clone())
            .with_retry_policy(config.retry_policy.clone())
            .with_clock(Arc::clone(&clock))
            .with_event_bus(event_bus.clone());

        let media = DriveMediaSource::new(config.http_client.clone())
            .with_api_base(config.drive_api_base.clone())
            .with_chunk_size(config.chunk_size);
        let engine = TransferEngine::new(Arc::new(media), config.file_system.clone())
            .with_clock(clock)
            .with_event_bus(event_bus.clone())
            .with_collision_policy(config.collision_policy);

        info!(
            api_base = %config.drive_api_base,
            download_dir = ?config.download_dir,
            "Drive fetch service initialized"
        );

        Ok(Self::from_parts(ServiceParts {
            auth: Arc::new(auth),
            catalog,
            engine: Arc::new(engine),
            event_bus,
            listing: ListingOptions {
                page_size: config.page_size,
                limit: config.listing_limit,
            },
            download_dir: config.download_dir,
        }))
    }

    pub fn from_parts(parts: ServiceParts) -> Self {
        Self {
            auth: parts.auth,
            catalog: parts.catalog,
            engine: parts.engine,
            event_bus: parts.event_bus,
            listing_options: parts.listing,
            download_dir: parts.download_dir,
            listing: Mutex::new(HashMap::new()),
            selection: Arc::new(Mutex::new(SelectionSet::new())),
            batch_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    /// Obtain a credential, running the interactive flow when needed.
    ///
    /// A valid persisted credential is reused and an expired one is
    /// refreshed silently; consent is only asked for when neither works.
    pub async fn sign_in(&self) -> Result<Credential> {
        Ok(self.auth.obtain_credential().await?)
    }

    /// Run the consent flow even when a usable credential exists.
    pub async fn reauthorize(&self) -> Result<Credential> {
        Ok(self.auth.sign_in().await?)
    }

    /// Forget the credential and the listing state built with it.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        self.listing.lock().await.clear();
        self.selection.lock().await.clear();
        Ok(())
    }

    pub async fn is_signed_in(&self) -> Result<bool> {
        Ok(self.auth.is_signed_in().await?)
    }

    /// List remote files and remember them as the current listing.
    ///
    /// A rejected credential is renewed once and the listing retried.
    #[instrument(skip(self))]
    pub async fn list_entries(&self) -> Result<Vec<CatalogEntry>> {
        let credential = self.auth.obtain_credential().await?;
        let entries = match self.fetch_listing(&credential).await {
            Err(ApiError::Unauthorized(message)) => {
                warn!(reason = %message, "Listing rejected the credential, renewing once");
                let renewed = self.auth.renew().await?;
                self.fetch_listing(&renewed).await?
            }
            other => other?,
        };

        let mut listing = self.listing.lock().await;
        listing.clear();
        listing.extend(
            entries
                .iter()
                .map(|entry| (entry.remote_id.clone(), entry.clone())),
        );

        info!(entries = entries.len(), "Listing refreshed");
        Ok(entries)
    }

    async fn fetch_listing(&self, credential: &Credential) -> provider_google_drive::Result<Vec<CatalogEntry>> {
        self.catalog
            .list_files(
                credential,
                self.listing_options.page_size,
                self.listing_options.limit,
            )
            .collect_all()
            .await
    }

    /// Select or deselect an entry of the most recent listing.
    pub async fn select(&self, remote_id: &str, selected: bool) -> Result<bool> {
        let entry = self
            .listing
            .lock()
            .await
            .get(remote_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownEntry(remote_id.to_string()))?;

        Ok(self.selection.lock().await.toggle(&entry, selected))
    }

    pub async fn current_selection(&self) -> Vec<CatalogEntry> {
        self.selection.lock().await.snapshot()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Transfer the current selection into `destination_dir` in the
    /// background.
    ///
    /// Successfully transferred entries leave the selection when the batch
    /// finishes; failed and cancelled ones stay selected.
    pub async fn start_transfer_batch(
        &self,
        destination_dir: impl Into<PathBuf>,
    ) -> Result<TransferBatchHandle> {
        if self.batch_running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::BatchInProgress);
        }
        let guard = BatchGuard(Arc::clone(&self.batch_running));

        let entries = self.selection.lock().await.snapshot();
        let destination_dir = destination_dir.into();
        let (sink, progress) = ProgressSink::channel();
        let cancel = CancellationToken::new();

        let credentials: Arc<dyn CredentialProvider> = self.auth.clone();
        let batch = TransferBatch::new(Arc::clone(&self.engine), credentials);
        let selection = Arc::clone(&self.selection);
        let task_cancel = cancel.clone();

        let report = tokio::spawn(async move {
            let _guard = guard;
            let report = batch
                .run(entries, &destination_dir, &sink, &task_cancel)
                .await;

            let mut selection = selection.lock().await;
            for outcome in report.succeeded() {
                selection.remove(&outcome.entry.remote_id);
            }
            report
        });

        Ok(TransferBatchHandle {
            progress,
            cancel,
            report,
        })
    }

    /// Transfer the current selection into the configured download directory.
    pub async fn start_default_transfer_batch(&self) -> Result<TransferBatchHandle> {
        self.start_transfer_batch(self.download_dir.clone()).await
    }
}

impl std::fmt::Debug for DriveFetchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveFetchService")
            .field("catalog", &self.catalog)
            .field("engine", &self.engine)
            .field("listing_options", &self.listing_options)
            .field("download_dir", &self.download_dir)
            .finish()
    }
}

/// Clears the running flag when the batch task ends, even by panic.
struct BatchGuard(Arc<AtomicBool>);

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Store the credential in the OS keychain instead of a file.
#[cfg(feature = "keyring")]
pub fn use_os_keychain(
    builder: core_runtime::config::AppConfigBuilder,
) -> core_runtime::config::AppConfigBuilder {
    builder.secure_store(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}
