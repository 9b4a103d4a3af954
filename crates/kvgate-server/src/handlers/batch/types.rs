//! Data types for batch access operations.

use kvgate_storage::{Interrupt, Key, StorageError, Value};

/// Operation name attached to read batch errors.
pub const READ_OP: &str = "batch.read";

/// Operation name attached to write batch errors.
pub const WRITE_OP: &str = "batch.write";

/// Default number of workers per batch.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on workers per batch.
pub const MAX_WORKERS: usize = 64;

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of point operations in flight for one batch.
    pub workers: usize,
}

impl EngineConfig {
    /// Creates a config with `workers` clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Errors that can occur during batch operations.
///
/// Only the first failure observed by a batch is reported; later failures
/// are logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// A point operation failed for `key`.
    #[error("{op}: key {key:?}: {source}")]
    Store {
        op: &'static str,
        key: Key,
        #[source]
        source: StorageError,
    },

    /// The request context was cancelled.
    #[error("{op}: request cancelled")]
    Cancelled { op: &'static str },

    /// The request context deadline passed.
    #[error("{op}: deadline exceeded")]
    DeadlineExceeded { op: &'static str },

    /// A worker task panicked or was aborted.
    #[error("{op}: worker failed: {message}")]
    Worker { op: &'static str, message: String },
}

impl BatchError {
    /// Builds the error for a context interrupt.
    pub fn interrupted(op: &'static str, interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => BatchError::Cancelled { op },
            Interrupt::DeadlineExceeded => BatchError::DeadlineExceeded { op },
        }
    }

    /// Wraps a driver failure. Interrupt errors reported by the driver keep
    /// their kind instead of being treated as store failures.
    pub fn from_storage(op: &'static str, key: Key, source: StorageError) -> Self {
        match source {
            StorageError::Cancelled => BatchError::Cancelled { op },
            StorageError::DeadlineExceeded => BatchError::DeadlineExceeded { op },
            source => BatchError::Store { op, key, source },
        }
    }

    /// The operation name this error is attributed to.
    pub fn op(&self) -> &'static str {
        match self {
            BatchError::Store { op, .. }
            | BatchError::Cancelled { op }
            | BatchError::DeadlineExceeded { op }
            | BatchError::Worker { op, .. } => op,
        }
    }

    /// The key whose point operation failed, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            BatchError::Store { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Returns true if the batch ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BatchError::DeadlineExceeded { .. })
    }

    /// Returns true if the batch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Cancelled { .. })
    }
}

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// What a worker reports back for a single item.
#[derive(Debug)]
pub(crate) enum Outcome {
    Fetched { key: Key, value: Option<Value> },
    Stored,
    Failed(BatchError),
}
