use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Drive API error: {0}")]
    Api(#[from] provider_google_drive::ApiError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] core_transfer::TransferError),

    /// The id is not part of the most recent listing.
    #[error("Unknown catalog entry: {0}")]
    UnknownEntry(String),

    #[error("A transfer batch is already running")]
    BatchInProgress,
}

pub type Result<T> = std::result::Result<T, CoreError>;
