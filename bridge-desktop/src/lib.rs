//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (buffered with retry, or streamed)
//! - `FileSystemAccess` using `tokio::fs`
//! - `SecureStore` backed by owner-only JSON files ([`FileSecureStore`])
//! - `SecureStore` backed by the OS keychain ([`KeyringSecureStore`], `keyring` feature)
//!
//! ## Feature Flags
//!
//! - `keyring`: Enable OS keychain integration
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileSecureStore, ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let fs = TokioFileSystem::new();
//!     let secrets = FileSecureStore::new(bridge_desktop::default_data_dir());
//!     // Hand these to the application config
//!     Ok(())
//! }
//! ```

mod paths;
mod filesystem;
mod http;
mod secure_store;

#[cfg(feature = "keyring")]
mod keyring_store;

pub use paths::{default_data_dir, default_download_dir, APP_DIR_NAME};
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use secure_store::FileSecureStore;

#[cfg(feature = "keyring")]
pub use keyring_store::KeyringSecureStore;
