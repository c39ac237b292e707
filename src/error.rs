//! Error types for feedwatch.

use thiserror::Error;

/// Common error type for feedwatch.
#[derive(Error, Debug)]
pub enum FeedwatchError {
    /// Feed transport or document parse failure.
    ///
    /// Treated as "no new results" by the scheduler and retried at the
    /// next firing.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Subscription record could not be written or deleted.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error for subscription input or configuration values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Notification sink reported a delivery failure.
    #[error("notification error: {0}")]
    Notification(String),
}

/// Result type alias for feedwatch operations.
pub type Result<T> = std::result::Result<T, FeedwatchError>;
