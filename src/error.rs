//! Error types for the record broker

use thiserror::Error;

/// Unified error type covering storage, pricing and workflow failures
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Rejected input: non-positive quantity or price, weight sums off,
    /// or a lifecycle action applied to an item in the wrong status
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A guarded status update lost the race against a concurrent writer
    #[error("Status conflict: {0}")]
    StatusConflict(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to parse a JSON payload
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Upstream API returned a non-success status code
    #[error("HTTP error status: {0}")]
    HttpStatus(reqwest::StatusCode),

    /// Anything that indicates a bug rather than bad input
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, BrokerError>;
