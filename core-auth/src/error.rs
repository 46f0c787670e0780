use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The user declined consent in the browser.
    #[error("Authorization was denied by the user")]
    UserDenied,

    /// No authorization redirect arrived in time.
    #[error("Authorization timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The refresh token was revoked or is otherwise unusable.
    #[error("Refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("OAuth state mismatch (possible CSRF)")]
    StateMismatch,

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    /// Transient token endpoint failure that persisted through retries.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Callback listener failed: {0}")]
    CallbackListenerFailed(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Stored credential is corrupted: {0}")]
    TokenCorrupted(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::UserDenied
                | AuthError::Timeout { .. }
                | AuthError::RefreshRejected(_)
                | AuthError::TokenRefreshFailed(_)
                | AuthError::NetworkError(_)
                | AuthError::CallbackListenerFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
