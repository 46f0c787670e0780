use provider_google_drive::ApiError;
use thiserror::Error;

/// Per-file transfer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The connection failed mid-transfer. The caller may retry.
    #[error("Network interrupted: {0}")]
    NetworkInterrupted(String),

    /// The server rejected the credential. The caller refreshes once and retries.
    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    /// Disk full, permission denied and the like. Never retried.
    #[error("Local write failed: {0}")]
    LocalWriteFailed(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Remote error (status {status}): {message}")]
    Remote { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransferError::Unauthorized(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

impl From<ApiError> for TransferError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized(message) => TransferError::Unauthorized(message),
            ApiError::NotFound(message) => TransferError::NotFound(message),
            ApiError::Network(message) | ApiError::Malformed(message) => {
                TransferError::NetworkInterrupted(message)
            }
            ApiError::RateLimited { .. } => TransferError::Remote {
                status: 429,
                message: error.to_string(),
            },
            ApiError::Http { status, message } => TransferError::Remote { status, message },
        }
    }
}
