//! Error types for dcatd.

use thiserror::Error;

/// Result type alias using dcatd's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dcatd operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document with the requested id already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The stored ETag did not match any of the candidate ETags
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Invalid input (malformed body, header misuse, id mismatch)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed or unsupported search filter
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backend call exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A backend reported a failure unrelated to the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the sentinel that first-result dispatch skips over.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
