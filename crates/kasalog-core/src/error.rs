//! Error types for kasalog.

use thiserror::Error;

/// Result type alias using kasalog's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kasalog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Store rejected the operation (backend unavailable, constraint violation)
    #[error("Store error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
