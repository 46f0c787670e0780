//! Error types for Google Drive provider

use crate::types::ErrorResponse;
use std::collections::HashMap;
use thiserror::Error;

/// Google Drive API errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server rejected the credential. It is the final authority,
    /// regardless of the locally recorded expiry.
    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded{}", retry_hint(.retry_after_seconds))]
    RateLimited { retry_after_seconds: Option<u64> },

    /// Failed to parse API response
    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Google Drive API error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, ApiError>;

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl ApiError {
    /// Map a non-2xx reply to an error.
    pub fn from_status(status: u16, headers: &HashMap<String, String>, body: &[u8]) -> Self {
        let envelope = serde_json::from_slice::<ErrorResponse>(body).ok();
        let message = match &envelope {
            Some(envelope) if !envelope.error.message.is_empty() => envelope.error.message.clone(),
            _ => String::from_utf8_lossy(body).trim().to_string(),
        };
        let rate_limited = envelope.as_ref().is_some_and(|envelope| {
            envelope
                .error
                .errors
                .iter()
                .any(|detail| RATE_LIMIT_REASONS.contains(&detail.reason.as_str()))
        });

        match status {
            401 => ApiError::Unauthorized(message),
            429 => ApiError::RateLimited {
                retry_after_seconds: retry_after(headers),
            },
            403 if rate_limited => ApiError::RateLimited {
                retry_after_seconds: retry_after(headers),
            },
            404 => ApiError::NotFound(message),
            _ => ApiError::Http { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

fn retry_hint(retry_after_seconds: &Option<u64>) -> String {
    match retry_after_seconds {
        Some(seconds) => format!(", retry after {} seconds", seconds),
        None => String::new(),
    }
}

fn retry_after(headers: &HashMap<String, String>) -> Option<u64> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

impl From<bridge_traits::error::BridgeError> for ApiError {
    fn from(error: bridge_traits::error::BridgeError) -> Self {
        ApiError::Network(error.to_string())
    }
}
