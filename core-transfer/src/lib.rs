//! # Transfer Module
//!
//! Moves selected catalog entries onto local storage.
//!
//! ## Overview
//!
//! - [`export_policy`] decides between a raw download and an export, and the
//!   extension the export adds.
//! - [`TransferEngine`] streams one entry in bounded chunks into a staging
//!   file and publishes it with one rename.
//! - [`TransferBatch`] runs a selection snapshot sequentially with one
//!   credential renewal per entry.
//! - [`SelectionSet`] holds what the user picked.
//!
//! A failed or cancelled transfer never leaves a file at its final path.

pub mod batch;
pub mod engine;
pub mod error;
pub mod export_policy;
pub mod progress;
pub mod selection;
pub mod staging;

pub use batch::{BatchReport, BatchSummary, EntryOutcome, TransferBatch};
pub use engine::{sanitize_file_name, TransferEngine};
pub use error::{Result, TransferError};
pub use export_policy::{ExportSpec, NativeDocumentKind};
pub use progress::{ProgressSink, TransferProgress, TransferState};
pub use selection::SelectionSet;
pub use staging::StagingFile;
pub use tokio_util::sync::CancellationToken;
