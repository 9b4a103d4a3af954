//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No user with the given name exists.
    #[error("user not found: {username}")]
    UserNotFound { username: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// A single query exceeded its own timeout.
    #[error("query timeout after {timeout:?}: {operation}")]
    QueryTimeout {
        operation: String,
        timeout: Duration,
    },

    /// The request context was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The request context deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Health check failed.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true if the error came from the request context rather than
    /// from the store itself.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, StorageError::Cancelled | StorageError::DeadlineExceeded)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a backend health probe.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the backend answered.
    pub healthy: bool,
    /// Round-trip time of the probe.
    pub latency: Duration,
    /// Backend name ("memory", "postgres").
    pub backend: &'static str,
    /// Optional detail, e.g. pool statistics.
    pub message: Option<String>,
}
