//! Replog Error Types

use axum::http::StatusCode;
use thiserror::Error;

use crate::log::SeqNum;

/// Result type alias for replog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Replog error types
#[derive(Error, Debug)]
pub enum Error {
    // Caller input errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Quorum errors
    #[error("Quorum not reached for sequence {sequence_number}: {acknowledged}/{required} acknowledgements")]
    Timeout {
        sequence_number: SeqNum,
        acknowledged: usize,
        required: usize,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Log corrupted at offset {offset}: {reason}")]
    LogCorrupted { offset: u64, reason: String },

    #[error("Log serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a transient failure worth retrying later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Http(_) | Error::Storage(_) | Error::Io(_)
        )
    }

    /// Short machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Cancelled => "CANCELLED",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            _ => "INTERNAL",
        }
    }

    /// HTTP status reported to API callers for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
