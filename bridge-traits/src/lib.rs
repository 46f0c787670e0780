//! # Host Bridge Traits
//!
//! Platform abstraction traits that the core crates are written against.
//!
//! ## Overview
//!
//! This crate defines the contract between the credential/transfer core and the
//! platform-specific implementations. Each trait represents a capability the
//! core needs but does not own: moving bytes over HTTP, touching the local
//! file system, persisting secrets, reading the time, and forwarding logs.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Buffered and streaming HTTP operations
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Directory listing, staged writes, atomic rename
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic expiry checks
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations
//! should convert platform errors to `BridgeError` and keep the original context
//! (paths, status codes) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared as `Arc<dyn Trait>`
//! across async tasks.
//!
//! ## Examples
//!
//! ### Implementing HttpClient
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, StreamingResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//!
//!     async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy, StreamingResponse};
pub use storage::{FileSystemAccess, SecureStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
