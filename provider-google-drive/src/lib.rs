//! # Google Drive Provider
//!
//! Google Drive API v3 access for the rest of the workspace.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated file listing ([`CatalogClient`], [`CatalogPager`])
//! - Chunked media download with `Range` requests and export streams
//!   ([`DriveMediaSource`])
//! - Mapping of API replies to [`ApiError`]

pub mod catalog;
pub mod error;
pub mod media;
pub mod types;

pub use catalog::{CatalogClient, CatalogPager};
pub use error::{ApiError, Result};
pub use media::{ChunkStream, DriveMediaSource, MediaRequest, MediaSource};
pub use types::{CatalogEntry, DriveFile, FilesListResponse, FOLDER_MIME_TYPE};
