//! # Application Configuration
//!
//! Two pieces of configuration drive the core:
//!
//! - [`ClientRegistration`]: the OAuth client identity issued to the deploying
//!   party. It is read from the client registration file (`credentials.json`)
//!   and never written back.
//! - [`AppConfig`]: paths, tuning knobs and the platform bridges, assembled
//!   through [`AppConfig::builder`] with fail-fast validation.
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient`, `FileSystemAccess` and `SecureStore` are injected if not
//! provided. Without it, a missing bridge is reported as
//! [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AppConfig, ClientRegistration};
//!
//! let registration = ClientRegistration::from_file("credentials.json")?;
//! let config = AppConfig::builder()
//!     .registration(registration)
//!     .download_dir("/tmp/drive")
//!     .page_size(50)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{FileSystemAccess, HttpClient, RetryPolicy, SecureStore};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Read-only access to file contents and metadata.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Name of the persisted credential inside the secure store.
pub const DEFAULT_TOKEN_FILE_NAME: &str = "token.json";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Ranged downloads must be aligned to this granularity.
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);
/// Longest wait for the user to finish the consent flow.
pub const MAX_AUTH_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

// ============================================================================
// Client registration
// ============================================================================

/// OAuth client identity.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// On-disk layout: the registration nested under the application type.
#[derive(Deserialize)]
struct RegistrationFile {
    installed: Option<ClientRegistration>,
    web: Option<ClientRegistration>,
}

impl ClientRegistration {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            redirect_uris: Vec::new(),
        }
    }

    /// Parse a registration document (`{"installed": {...}}` or `{"web": {...}}`).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: RegistrationFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Malformed registration file: {}", e)))?;

        let registration = file.installed.or(file.web).ok_or_else(|| {
            Error::Config(
                "Registration file must contain an \"installed\" or \"web\" section".to_string(),
            )
        })?;

        registration.validate()?;
        Ok(registration)
    }

    /// Load the client registration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read registration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Build a registration from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").map_err(|_| {
            Error::Config("GOOGLE_CLIENT_ID environment variable not set".to_string())
        })?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok();

        let registration = Self::new(client_id, client_secret);
        registration.validate()?;
        Ok(registration)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id cannot be empty".to_string()));
        }
        validate_http_url("auth_uri", &self.auth_uri)?;
        validate_http_url("token_uri", &self.token_uri)?;
        Ok(())
    }
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}

// ============================================================================
// Application config
// ============================================================================

/// What to do when the final destination name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Pick `name (1).ext`, `name (2).ext`, ... instead.
    KeepBoth,
}

#[derive(Clone)]
pub struct AppConfig {
    pub registration: ClientRegistration,
    pub scopes: Vec<String>,
    /// Location of the persisted credential. Its parent directory roots the
    /// default secure store, its file name is the key.
    pub token_file: PathBuf,
    pub download_dir: PathBuf,
    pub page_size: u32,
    /// Stop listing after this many entries.
    pub listing_limit: Option<usize>,
    pub chunk_size: usize,
    pub auth_timeout: Duration,
    pub drive_api_base: String,
    /// Transport retries for listing and token calls. Transfers never retry.
    pub retry_policy: RetryPolicy,
    pub collision_policy: CollisionPolicy,
    pub event_buffer_size: usize,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub secure_store: Arc<dyn SecureStore>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("registration", &self.registration)
            .field("scopes", &self.scopes)
            .field("token_file", &self.token_file)
            .field("download_dir", &self.download_dir)
            .field("page_size", &self.page_size)
            .field("listing_limit", &self.listing_limit)
            .field("chunk_size", &self.chunk_size)
            .field("auth_timeout", &self.auth_timeout)
            .field("drive_api_base", &self.drive_api_base)
            .field("retry_policy", &self.retry_policy)
            .field("collision_policy", &self.collision_policy)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .finish()
    }
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Key under which the credential is stored.
    pub fn token_key(&self) -> String {
        self.token_file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_TOKEN_FILE_NAME)
            .to_string()
    }

    pub fn validate(&self) -> Result<()> {
        self.registration.validate()?;

        if self.scopes.is_empty() {
            return Err(Error::Config("At least one scope is required".to_string()));
        }

        if self.token_file.file_name().is_none() {
            return Err(Error::Config(
                "Token file must name a file, not a directory".to_string(),
            ));
        }

        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::Config("Download directory cannot be empty".to_string()));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.listing_limit == Some(0) {
            return Err(Error::Config(
                "Listing limit must be greater than 0 when set".to_string(),
            ));
        }

        if self.chunk_size < CHUNK_ALIGNMENT || self.chunk_size % CHUNK_ALIGNMENT != 0 {
            return Err(Error::Config(format!(
                "Chunk size must be a positive multiple of {} bytes",
                CHUNK_ALIGNMENT
            )));
        }

        if self.auth_timeout.is_zero() || self.auth_timeout > MAX_AUTH_TIMEOUT {
            return Err(Error::Config(format!(
                "Authorization timeout must be between 1 second and {} seconds",
                MAX_AUTH_TIMEOUT.as_secs()
            )));
        }

        validate_http_url("drive_api_base", &self.drive_api_base)?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Bridge defaults
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "HttpClient implementation is required for API calls. \
         Enable the 'desktop-shims' feature or inject one with .http_client().",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing(
        "FileSystemAccess",
        "FileSystemAccess implementation is required to write downloads. \
         Enable the 'desktop-shims' feature or inject one with .file_system().",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store(token_file: &Path) -> Result<Arc<dyn SecureStore>> {
    let root = token_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(Arc::new(bridge_desktop::FileSecureStore::new(root)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store(_token_file: &Path) -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "SecureStore implementation is required for credential persistence. \
         Enable the 'desktop-shims' feature or inject one with .secure_store().",
    ))
}

#[cfg(feature = "desktop-shims")]
fn default_token_file() -> PathBuf {
    bridge_desktop::default_data_dir().join(DEFAULT_TOKEN_FILE_NAME)
}

#[cfg(not(feature = "desktop-shims"))]
fn default_token_file() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_FILE_NAME)
}

#[cfg(feature = "desktop-shims")]
fn default_download_dir() -> PathBuf {
    bridge_desktop::default_download_dir()
}

#[cfg(not(feature = "desktop-shims"))]
fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
pub struct AppConfigBuilder {
    registration: Option<ClientRegistration>,
    scopes: Option<Vec<String>>,
    token_file: Option<PathBuf>,
    download_dir: Option<PathBuf>,
    page_size: Option<u32>,
    listing_limit: Option<usize>,
    chunk_size: Option<usize>,
    auth_timeout: Option<Duration>,
    drive_api_base: Option<String>,
    retry_policy: Option<RetryPolicy>,
    collision_policy: CollisionPolicy,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    secure_store: Option<Arc<dyn SecureStore>>,
}

impl AppConfigBuilder {
    pub fn registration(mut self, registration: ClientRegistration) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn token_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.token_file = Some(path.into());
        self
    }

    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn listing_limit(mut self, limit: usize) -> Self {
        self.listing_limit = Some(limit);
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    pub fn drive_api_base(mut self, base: impl Into<String>) -> Self {
        self.drive_api_base = Some(base.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn build(self) -> Result<AppConfig> {
        let registration = self.registration.ok_or_else(|| {
            Error::Config(
                "Client registration is required. Use .registration() to set it.".to_string(),
            )
        })?;

        let token_file = self.token_file.unwrap_or_else(default_token_file);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };
        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store(&token_file)?,
        };

        let config = AppConfig {
            registration,
            scopes: self
                .scopes
                .unwrap_or_else(|| vec![DRIVE_READONLY_SCOPE.to_string()]),
            token_file,
            download_dir: self.download_dir.unwrap_or_else(default_download_dir),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            listing_limit: self.listing_limit,
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            auth_timeout: self.auth_timeout.unwrap_or(DEFAULT_AUTH_TIMEOUT),
            drive_api_base: self
                .drive_api_base
                .unwrap_or_else(|| DEFAULT_DRIVE_API_BASE.to_string()),
            retry_policy: self.retry_policy.unwrap_or_default(),
            collision_policy: self.collision_policy,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            file_system,
            secure_store,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse, StreamingResponse};
    use bridge_traits::BridgeError;
    use std::path::PathBuf;
    use tokio::io::AsyncWrite;

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("mock".to_string()))
        }

        async fn open_stream(&self, _request: HttpRequest) -> BridgeResult<StreamingResponse> {
            Err(BridgeError::NotAvailable("mock".to_string()))
        }
    }

    struct MockFileSystem;

    #[async_trait]
    impl FileSystemAccess for MockFileSystem {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }

        async fn open_write_stream(
            &self,
            _path: &Path,
        ) -> BridgeResult<Box<dyn AsyncWrite + Send + Unpin>> {
            Ok(Box::new(tokio::io::sink()))
        }

        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn registration() -> ClientRegistration {
        ClientRegistration::new("client-123.apps.googleusercontent.com", Some("s3cr3t".into()))
    }

    fn builder_with_mocks() -> AppConfigBuilder {
        AppConfig::builder()
            .registration(registration())
            .token_file("/tmp/drive-fetch/token.json")
            .download_dir("/tmp/downloads")
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .secure_store(Arc::new(MockSecureStore))
    }

    #[test]
    fn test_registration_installed_layout() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let registration = ClientRegistration::from_json_str(json).unwrap();
        assert_eq!(registration.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(registration.client_secret.as_deref(), Some("shh"));
        assert_eq!(registration.redirect_uris, vec!["http://localhost"]);
    }

    #[test]
    fn test_registration_web_layout_with_default_endpoints() {
        let json = r#"{"web": {"client_id": "web-client"}}"#;
        let registration = ClientRegistration::from_json_str(json).unwrap();

        assert_eq!(registration.client_id, "web-client");
        assert_eq!(registration.client_secret, None);
        assert_eq!(registration.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(registration.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_registration_rejects_unknown_layout() {
        let result = ClientRegistration::from_json_str(r#"{"other": {"client_id": "x"}}"#);
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ClientRegistration::from_json_str("not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_registration_rejects_bad_endpoints() {
        let json = r#"{"installed": {"client_id": "x", "token_uri": "ftp://example.com/token"}}"#;
        assert!(ClientRegistration::from_json_str(json).is_err());

        let json = r#"{"installed": {"client_id": "  "}}"#;
        assert!(ClientRegistration::from_json_str(json).is_err());
    }

    #[test]
    fn test_registration_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"installed": {"client_id": "file-client"}}"#).unwrap();

        let registration = ClientRegistration::from_file(&path).unwrap();
        assert_eq!(registration.client_id, "file-client");

        let missing = ClientRegistration::from_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[test]
    fn test_registration_debug_hides_secret() {
        let debug = format!("{:?}", registration());
        assert!(debug.contains("client-123"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder_with_mocks().build().unwrap();

        assert_eq!(config.scopes, vec![DRIVE_READONLY_SCOPE.to_string()]);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.auth_timeout, Duration::from_secs(300));
        assert_eq!(config.drive_api_base, DEFAULT_DRIVE_API_BASE);
        assert_eq!(config.collision_policy, CollisionPolicy::Overwrite);
        assert_eq!(config.listing_limit, None);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.token_key(), "token.json");
    }

    #[test]
    fn test_builder_requires_registration() {
        let result = AppConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .secure_store(Arc::new(MockSecureStore))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(builder_with_mocks().page_size(0).build().is_err());
        assert!(builder_with_mocks().page_size(1001).build().is_err());
        assert!(builder_with_mocks().page_size(1000).build().is_ok());
    }

    #[test]
    fn test_chunk_size_alignment() {
        assert!(builder_with_mocks().chunk_size(1000).build().is_err());
        assert!(builder_with_mocks()
            .chunk_size(CHUNK_ALIGNMENT + 1)
            .build()
            .is_err());
        assert!(builder_with_mocks()
            .chunk_size(CHUNK_ALIGNMENT * 4)
            .build()
            .is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout_and_limit() {
        assert!(builder_with_mocks()
            .auth_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(builder_with_mocks()
            .auth_timeout(Duration::MAX)
            .build()
            .is_err());
        assert!(builder_with_mocks()
            .auth_timeout(MAX_AUTH_TIMEOUT)
            .build()
            .is_ok());
        assert!(builder_with_mocks().listing_limit(0).build().is_err());
    }

    #[test]
    fn test_rejects_invalid_api_base() {
        let result = builder_with_mocks().drive_api_base("not a url").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_custom_token_key() {
        let config = builder_with_mocks()
            .token_file("/var/lib/app/credential.json")
            .build()
            .unwrap();
        assert_eq!(config.token_key(), "credential.json");
    }

    #[test]
    fn test_debug_hides_bridges_and_secret() {
        let config = builder_with_mocks().build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("HttpClient { ... }"));
        assert!(debug.contains("SecureStore { ... }"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridge_is_capability_error() {
        let result = AppConfig::builder()
            .registration(registration())
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "SecureStore")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_missing_bridges() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::builder()
            .registration(registration())
            .token_file(dir.path().join("token.json"))
            .download_dir(dir.path())
            .build()
            .unwrap();

        assert_eq!(config.token_file, dir.path().join("token.json"));
    }
}
