//! In-memory storage implementation for testing and local runs.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::context::RequestContext;
use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{validate_key, DataStore, PointStore, User, UserStore, Value};

/// In-memory implementation of DataStore.
///
/// Uses DashMap for thread-safe concurrent access, so any number of batch
/// workers can issue point operations at once without an outer lock.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    values: DashMap<String, Value>,
    users: DashMap<String, User>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Builder-style helper that registers a user.
    pub fn with_user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.insert_user(username, password);
        self
    }

    /// Registers or replaces a user.
    pub fn insert_user(&self, username: impl Into<String>, password: impl Into<String>) {
        let username = username.into();
        self.users.insert(
            username.clone(),
            User {
                username,
                password: password.into(),
            },
        );
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl PointStore for MemoryDataStore {
    async fn fetch_one(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        ctx.run(async { Ok(self.values.get(key).map(|v| v.value().clone())) })
            .await
    }

    async fn store_one(&self, ctx: &RequestContext, key: &str, value: Value) -> StorageResult<()> {
        validate_key(key)?;
        ctx.run(async {
            self.values.insert(key.to_string(), value);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for MemoryDataStore {
    #[instrument(skip(self, ctx))]
    async fn get_user(&self, ctx: &RequestContext, username: &str) -> StorageResult<User> {
        ctx.run(async {
            self.users
                .get(username)
                .map(|u| u.value().clone())
                .ok_or_else(|| StorageError::UserNotFound {
                    username: username.to_string(),
                })
        })
        .await
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();
        Ok(HealthStatus {
            healthy: true,
            latency: start.elapsed(),
            backend: "memory",
            message: Some(format!("{} keys, {} users", self.values.len(), self.users.len())),
        })
    }
}
