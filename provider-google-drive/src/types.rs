//! Google Drive API response types
//!
//! Data structures for deserializing Google Drive API v3 responses, and the
//! provider-neutral [`CatalogEntry`] handed to the rest of the workspace.

use serde::{Deserialize, Serialize};

/// Content type of Drive folders. Folders have no content to fetch.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google Drive API file resource, limited to the fields the catalog requests.
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    /// Omitted by the API when the page is empty
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub incomplete_search: bool,
}

/// Error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// One remote file as listed by the catalog.
///
/// `remote_id` is opaque and unique per account; it is the identity used by
/// selections and transfers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub remote_id: String,
    pub display_name: String,
    pub content_type: String,
}

impl CatalogEntry {
    pub fn new(
        remote_id: impl Into<String>,
        display_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            display_name: display_name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.content_type == FOLDER_MIME_TYPE
    }
}

impl From<DriveFile> for CatalogEntry {
    fn from(file: DriveFile) -> Self {
        Self {
            remote_id: file.id,
            display_name: file.name,
            content_type: file.mime_type,
        }
    }
}
