//! Application state for HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use kvgate_server::handlers::auth::DEFAULT_TOKEN_TTL;
use kvgate_server::{AccessLayer, AuthService, BatchEngine, EngineConfig, ServerConfig};
use kvgate_storage::{DataStore, RequestContext};
use tokio_util::sync::CancellationToken;

/// Default deadline for one batch read or write.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all HTTP handlers.
///
/// # Type Parameters
///
/// * `S` - The storage backend implementing `DataStore`
///
/// The same backend serves batch access and user lookups.
pub struct AppState<S: DataStore> {
    /// The storage backend.
    pub storage: Arc<S>,
    /// Timeout-bounded batch access.
    pub access: AccessLayer<S>,
    /// Login and token verification.
    pub auth: Arc<AuthService<S>>,
    /// Deadline applied to every batch.
    pub request_timeout: Duration,
    /// Cancelled when the server shuts down; every request context derives
    /// from it.
    pub shutdown: CancellationToken,
}

// Manual impl: derive would require `S: Clone`.
impl<S: DataStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            access: self.access.clone(),
            auth: Arc::clone(&self.auth),
            request_timeout: self.request_timeout,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: DataStore> AppState<S> {
    /// Creates a new application state with default engine and timeouts.
    pub fn new(storage: Arc<S>, secret: &str) -> Self {
        Self::with_settings(
            storage,
            secret,
            DEFAULT_TOKEN_TTL,
            EngineConfig::default(),
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Creates application state from loaded server configuration.
    pub fn from_config(storage: Arc<S>, config: &ServerConfig) -> Self {
        Self::with_settings(
            storage,
            &config.auth.secret,
            config.auth.token_ttl(),
            EngineConfig::new(config.batch.workers),
            config.server.request_timeout(),
        )
    }

    pub fn with_settings(
        storage: Arc<S>,
        secret: &str,
        token_ttl: Duration,
        engine_config: EngineConfig,
        request_timeout: Duration,
    ) -> Self {
        let engine = BatchEngine::with_config(Arc::clone(&storage), engine_config);

        Self {
            access: AccessLayer::with_engine(engine),
            auth: Arc::new(AuthService::new(Arc::clone(&storage), secret, token_ttl)),
            storage,
            request_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replaces the shutdown token, e.g. with one owned by the binary.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// A fresh context for one inbound request.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::from_token(self.shutdown.child_token())
    }
}
