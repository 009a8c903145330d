//! Error types for Courier.

use thiserror::Error;

/// Main error type for Courier operations.
///
/// Per-device delivery failures are not errors; they are collected into
/// the dispatch report. Only faults that prevent an operation as a whole
/// (bad input, registry misses, store or resolver failures) surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading or parsing error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Malformed or missing input. The calling layer maps this to a
    /// bad-request response.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Registry lookup miss (rotate/remove on an absent token).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store or resolver fault unrelated to the request itself.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for registry lookup misses.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
