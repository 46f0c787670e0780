//! Platform directory defaults.

use std::path::PathBuf;

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "drive-fetch";

/// Application data directory (`~/.local/share/drive-fetch` on Linux).
///
/// Falls back to `./.drive-fetch` when the platform reports no home.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|base| base.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR_NAME)))
}

/// Download directory, falling back to the current directory.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}
