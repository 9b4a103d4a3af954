//! Shared test utilities for kvgate API tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
};
use tower::ServiceExt;

use kvgate_api::http::{create_router, AppState};
use kvgate_server::EngineConfig;
use kvgate_storage::{
    DataStore, HealthStatus, Key, MemoryDataStore, PointStore, RequestContext, StorageError,
    StorageResult, User, UserStore, Value,
};

// =============================================================================
// Test Constants
// =============================================================================

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_USER: &str = "alice";
pub const TEST_PASSWORD: &str = "wonderland";

/// Number of concurrent clients for integration tests.
pub const CONCURRENT_CLIENT_COUNT: usize = 50;

// =============================================================================
// Apps
// =============================================================================

/// In-memory storage with the test account.
pub fn create_storage() -> Arc<MemoryDataStore> {
    Arc::new(MemoryDataStore::new().with_user(TEST_USER, TEST_PASSWORD))
}

/// Router over `storage` with default engine settings.
///
/// Each call creates a fresh `AppState` wrapping the shared storage, which is
/// the pattern `oneshot` testing needs.
pub fn create_test_app<S: DataStore>(storage: &Arc<S>) -> axum::Router {
    create_router(AppState::new(Arc::clone(storage), TEST_SECRET))
}

/// Router with an explicit request timeout and worker count.
pub fn create_test_app_with<S: DataStore>(
    storage: &Arc<S>,
    request_timeout: Duration,
    workers: usize,
) -> axum::Router {
    create_router(AppState::with_settings(
        Arc::clone(storage),
        TEST_SECRET,
        Duration::from_secs(600),
        EngineConfig::new(workers),
        request_timeout,
    ))
}

// =============================================================================
// Requests
// =============================================================================

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Body-limit rejections and other plain-text bodies are wrapped.
    let json = if body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::json!({
                "raw_body": String::from_utf8_lossy(&body).to_string()
            })
        })
    };
    (status, json)
}

/// Make a JSON POST request and return status + parsed JSON response.
pub async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_json_with_token(app, uri, None, body).await
}

/// Make a JSON POST request with an optional bearer token.
pub async fn post_json_with_token(
    app: axum::Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

/// Make a raw POST request with a string body and a bearer token.
pub async fn post_raw_with_token(
    app: axum::Router,
    uri: &str,
    token: &str,
    body: &str,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

/// Logs in as the test user and returns the token.
pub async fn login(app: axum::Router) -> String {
    let (status, body) = post_json(
        app,
        "/api/login",
        serde_json::json!({"username": TEST_USER, "password": TEST_PASSWORD}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

// =============================================================================
// Store doubles
// =============================================================================

/// Store whose behavior per point operation is scripted.
///
/// Delays honor the request context the way a network driver would.
pub struct ScriptedStore {
    inner: MemoryDataStore,
    delay: Duration,
    failing_key: Option<String>,
    fail_every_key: bool,
    healthy: bool,
    pub calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDataStore::new().with_user(TEST_USER, TEST_PASSWORD),
            delay: Duration::ZERO,
            failing_key: None,
            fail_every_key: false,
            healthy: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing_key = Some(key.to_string());
        self
    }

    pub fn failing_on_every_key(mut self) -> Self {
        self.fail_every_key = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn point_call(&self, ctx: &RequestContext, key: &str) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.run(async {
            tokio::time::sleep(self.delay).await;
            if self.fail_every_key || self.failing_key.as_deref() == Some(key) {
                return Err(StorageError::QueryError {
                    message: format!("scripted failure for {key}"),
                });
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PointStore for ScriptedStore {
    async fn fetch_one(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<Value>> {
        self.point_call(ctx, key).await?;
        self.inner.fetch_one(ctx, key).await
    }

    async fn store_one(&self, ctx: &RequestContext, key: &str, value: Value) -> StorageResult<()> {
        self.point_call(ctx, key).await?;
        self.inner.store_one(ctx, key, value).await
    }
}

#[async_trait]
impl UserStore for ScriptedStore {
    async fn get_user(&self, ctx: &RequestContext, username: &str) -> StorageResult<User> {
        self.inner.get_user(ctx, username).await
    }
}

#[async_trait]
impl DataStore for ScriptedStore {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        if self.healthy {
            self.inner.health_check().await
        } else {
            Err(StorageError::HealthCheckFailed {
                message: "scripted outage".to_string(),
            })
        }
    }
}

/// Builds `{ "data": { k: v, ... } }` for a write request.
pub fn write_body(pairs: &[(&str, serde_json::Value)]) -> serde_json::Value {
    let data: HashMap<Key, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    serde_json::json!({ "data": data })
}
