//! PostgreSQL storage implementation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{validate_key, DataStore, PointStore, User, UserStore, Value};

/// Default health check timeout in seconds.
/// Uses a shorter timeout than regular queries since health checks should be fast.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound for a single point query, applied on top of the request
    /// context deadline.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/kvgate".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of DataStore.
///
/// Values live in `kv_storage(key, value JSONB)`, accounts in
/// `kv_users(username, password)`. The pool is safe to share between batch
/// workers; each point operation checks out its own connection.
pub struct PostgresDataStore {
    pool: PgPool,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

impl PostgresDataStore {
    /// Creates a new PostgreSQL data store from configuration.
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates a new PostgreSQL data store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = PostgresConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_storage (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create kv_storage table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_users (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create kv_users table: {e}"),
        })?;

        debug!("Database migrations complete");
        Ok(())
    }

    /// Registers or replaces a user account.
    pub async fn upsert_user(&self, username: &str, password: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO kv_users (username, password) VALUES ($1, $2) \
             ON CONFLICT (username) DO UPDATE SET password = EXCLUDED.password",
        )
        .bind(username)
        .bind(password)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to upsert user: {e}"),
        })?;
        Ok(())
    }

    /// Deletes a key. Used by integration tests to clean up.
    pub async fn delete_key(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM kv_storage WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to delete key: {e}"),
            })?;
        Ok(())
    }

    /// Runs a query bounded by both the request context and the per-query
    /// timeout, recording duration and outcome metrics.
    ///
    /// # Metrics
    /// - `kvgate_storage_query_duration_seconds` - Histogram of query durations
    /// - `kvgate_storage_query_timeout_total` - Counter of per-query timeouts
    async fn execute_with_timeout_and_metrics<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        future: F,
    ) -> StorageResult<T>
    where
        F: std::future::Future<Output = StorageResult<T>>,
    {
        let start = std::time::Instant::now();
        let timeout = self.query_timeout;
        let result = ctx
            .run(async {
                match tokio::time::timeout(timeout, future).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(StorageError::QueryTimeout {
                        operation: operation.to_string(),
                        timeout,
                    }),
                }
            })
            .await;
        let duration = start.elapsed().as_secs_f64();

        let status = match &result {
            Ok(_) => "success",
            Err(StorageError::QueryTimeout { .. }) => "timeout",
            Err(StorageError::Cancelled) | Err(StorageError::DeadlineExceeded) => "interrupted",
            Err(_) => "error",
        };

        metrics::histogram!(
            "kvgate_storage_query_duration_seconds",
            "operation" => operation,
            "backend" => "postgres",
            "status" => status
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "kvgate_storage_query_timeout_total",
                "operation" => operation,
                "backend" => "postgres"
            )
            .increment(1);
        }

        result
    }
}

#[async_trait]
impl PointStore for PostgresDataStore {
    async fn fetch_one(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        self.execute_with_timeout_and_metrics(ctx, "fetch_one", async {
            sqlx::query_scalar::<_, Value>("SELECT value FROM kv_storage WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to fetch key: {e}"),
                })
        })
        .await
    }

    async fn store_one(&self, ctx: &RequestContext, key: &str, value: Value) -> StorageResult<()> {
        validate_key(key)?;
        self.execute_with_timeout_and_metrics(ctx, "store_one", async move {
            sqlx::query(
                "INSERT INTO kv_storage (key, value) VALUES ($1, $2) \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError {
                message: format!("Failed to store key: {e}"),
            })?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for PostgresDataStore {
    #[instrument(skip(self, ctx))]
    async fn get_user(&self, ctx: &RequestContext, username: &str) -> StorageResult<User> {
        let row = self
            .execute_with_timeout_and_metrics(ctx, "get_user", async {
                sqlx::query_as::<_, (String, String)>(
                    "SELECT username, password FROM kv_users WHERE username = $1",
                )
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to fetch user: {e}"),
                })
            })
            .await?;

        match row {
            Some((username, password)) => Ok(User { username, password }),
            None => Err(StorageError::UserNotFound {
                username: username.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DataStore for PostgresDataStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = std::time::Instant::now();

        // Uses a shorter dedicated timeout since health checks should be fast
        let check_result = tokio::time::timeout(self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::HealthCheckFailed {
                    message: format!("database ping failed: {e}"),
                })
        })
        .await;

        let latency = start.elapsed();

        match check_result {
            Ok(result) => {
                result?;
            }
            Err(_elapsed) => {
                return Err(StorageError::QueryTimeout {
                    operation: "health_check".to_string(),
                    timeout: self.health_check_timeout,
                });
            }
        }

        // pool.size() returns total connections, so active = size - idle
        let total_connections = self.pool.size();
        let idle_connections = self.pool.num_idle() as u32;
        let active_connections = total_connections.saturating_sub(idle_connections);

        Ok(HealthStatus {
            healthy: true,
            latency,
            backend: "postgres",
            message: Some(format!(
                "pool: {active_connections} active, {idle_connections} idle"
            )),
        })
    }
}
