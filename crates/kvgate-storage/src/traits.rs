//! Driver trait definitions and the key/value data model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{HealthStatus, StorageError, StorageResult};

/// Opaque identifying string. Must be non-empty.
pub type Key = String;

/// Opaque, dynamically-typed payload. The store never inspects it.
///
/// Point lookups return `Option<Value>`: `None` is an absent key, which is
/// distinct from a stored JSON `null`.
pub type Value = serde_json::Value;

/// Maximum key length in bytes accepted by the drivers.
pub const MAX_KEY_LENGTH: usize = 1024;

/// The unit of a write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub key: Key,
    pub value: Value,
}

impl Pair {
    pub fn new(key: impl Into<Key>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A stored account used by the login flow.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

// Keep passwords out of logs.
impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validates a key before it reaches a backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "key cannot be empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "key exceeds maximum length of {MAX_KEY_LENGTH} bytes (actual: {} bytes)",
                key.len()
            ),
        });
    }
    Ok(())
}

/// Single-key access to the remote store.
///
/// Every call is an independent point operation that may fail. Implementations
/// must observe `ctx` and return `StorageError::Cancelled` or
/// `StorageError::DeadlineExceeded` instead of hanging once it is done.
/// Implementations must be safe to call concurrently from many tasks.
#[async_trait]
pub trait PointStore: Send + Sync + 'static {
    /// Fetches the value stored under `key`.
    ///
    /// Returns `Ok(None)` for a legitimate miss. Errors are reserved for
    /// connectivity or protocol failures.
    async fn fetch_one(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn store_one(&self, ctx: &RequestContext, key: &str, value: Value) -> StorageResult<()>;
}

/// User lookup for the identity layer. Not batched.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Returns `StorageError::UserNotFound` when no such user exists.
    async fn get_user(&self, ctx: &RequestContext, username: &str) -> StorageResult<User>;
}

/// A complete backend: point operations, user lookup and a health probe.
#[async_trait]
pub trait DataStore: PointStore + UserStore {
    /// Probes backend connectivity.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}
