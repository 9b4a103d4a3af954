//! HTTP route definitions and handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, warn};

use kvgate_server::{AuthError, BatchError};
use kvgate_storage::{validate_key, DataStore, Key, StorageError, Value};

use super::auth::{require_bearer, AuthenticatedUser};
use super::state::AppState;
use crate::middleware::{MetricsLayer, RequestIdLayer, RequestLoggingLayer};
use crate::observability::{metrics_handler, MetricsState};

/// Custom JSON extractor that returns 400 Bad Request instead of 422 Unprocessable Entity
/// for deserialization errors.
///
/// Preserves 413 Payload Too Large for body limit errors.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                use axum::extract::rejection::JsonRejection;

                // BytesRejection wraps body limit errors
                let status = match &rejection {
                    JsonRejection::BytesRejection(_)
                        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE =>
                    {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    _ => StatusCode::BAD_REQUEST,
                };

                let message = rejection.body_text();
                let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::payload_too_large(message)
                } else {
                    ApiError::validation_error(message)
                };

                Err((status, Json(error)))
            }
        }
    }
}

/// Default request body size limit (1MB).
/// This prevents memory exhaustion from oversized payloads.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Routes under `/api`. Write and read sit behind the bearer middleware.
fn api_routes<S: DataStore>(state: Arc<AppState<S>>) -> Router<Arc<AppState<S>>> {
    let protected = Router::new()
        .route("/api/write", post(write_data::<S>))
        .route("/api/read", post(read_data::<S>))
        .route_layer(middleware::from_fn_with_state(state, require_bearer::<S>));

    Router::new()
        .route("/api/login", post(login::<S>))
        .merge(protected)
}

/// Fallback, request ID, logging and metrics layers shared by every router
/// variant. The request ID layer is outermost so the others can read it.
fn with_http_layers(router: Router) -> Router {
    router
        .fallback(route_not_found)
        .layer(MetricsLayer::default())
        .layer(RequestLoggingLayer::new())
        .layer(RequestIdLayer::new())
}

/// Creates the HTTP router with the API and probe endpoints.
///
/// Applies the default body size limit (1MB) to protect against oversized payloads.
pub fn create_router<S: DataStore>(state: AppState<S>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
///
/// # Arguments
///
/// * `state` - Application state with storage backend
/// * `body_limit` - Maximum request body size in bytes
pub fn create_router_with_body_limit<S: DataStore>(
    state: AppState<S>,
    body_limit: usize,
) -> Router {
    let shared_state = Arc::new(state);
    let router = api_routes::<S>(Arc::clone(&shared_state))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<S>))
        .with_state(shared_state)
        .layer(RequestBodyLimitLayer::new(body_limit));

    with_http_layers(router)
}

/// Creates the HTTP router with observability endpoints.
///
/// This includes the API endpoints plus:
/// - `/metrics` - Prometheus metrics endpoint
/// - `/health` - Basic health check
/// - `/ready` - Readiness check (probes the storage backend)
///
/// # Arguments
///
/// * `state` - Application state with storage backend
/// * `metrics_state` - Metrics state for Prometheus endpoint
pub fn create_router_with_observability<S: DataStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
) -> Router {
    create_router_with_observability_and_limit(state, metrics_state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with observability endpoints and custom body size limit.
pub fn create_router_with_observability_and_limit<S: DataStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
    body_limit: usize,
) -> Router {
    let shared_state = Arc::new(state);

    let api_router = api_routes::<S>(Arc::clone(&shared_state))
        .route("/ready", get(readiness_check::<S>))
        .with_state(shared_state)
        // Body limit applies to API routes only
        .layer(RequestBodyLimitLayer::new(body_limit));

    let observability_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(metrics_state);

    with_http_layers(api_router.merge(observability_router))
}

// ============================================================
// Error Handling
// ============================================================

/// Error codes carried in the `code` field of every error body.
///
/// Each code maps to one HTTP status in [`ApiError::into_response`]:
///
/// | Code | Status |
/// |------|--------|
/// | [`VALIDATION_ERROR`] | 400 |
/// | [`UNAUTHORIZED`] | 401 |
/// | [`NOT_FOUND`] | 404 |
/// | [`PAYLOAD_TOO_LARGE`] | 413 |
/// | [`INTERNAL_ERROR`] | 500 |
/// | [`SERVICE_UNAVAILABLE`] | 503 |
/// | [`TIMEOUT`] | 504 |
pub mod error_codes {
    /// Malformed body, missing fields or invalid keys.
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// Missing or invalid credentials or bearer token.
    pub const UNAUTHORIZED: &str = "unauthorized";
    /// No such route or resource.
    pub const NOT_FOUND: &str = "not_found";
    /// Request body exceeds the configured limit.
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    /// Store failure or unexpected internal error.
    pub const INTERNAL_ERROR: &str = "internal_error";
    /// Backend unreachable or server shutting down.
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    /// The request deadline passed before the batch finished.
    pub const TIMEOUT: &str = "timeout";
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(error_codes::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(error_codes::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(error_codes::SERVICE_UNAVAILABLE, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(error_codes::TIMEOUT, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use error_codes::*;

        let status = match self.code.as_str() {
            VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            UNAUTHORIZED => StatusCode::UNAUTHORIZED,
            NOT_FOUND => StatusCode::NOT_FOUND,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::InvalidInput { message } => ApiError::validation_error(message),
            StorageError::ConnectionError { .. } | StorageError::HealthCheckFailed { .. } => {
                error!("Storage unavailable: {}", err);
                ApiError::service_unavailable("storage backend unavailable")
            }
            StorageError::QueryTimeout { .. } | StorageError::DeadlineExceeded => {
                error!("Storage timeout: {}", err);
                ApiError::gateway_timeout("storage operation timed out")
            }
            StorageError::Cancelled => ApiError::service_unavailable("request cancelled"),
            _ => {
                error!("Storage error: {}", err);
                ApiError::internal_error("storage operation failed")
            }
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match &err {
            BatchError::DeadlineExceeded { .. } => {
                ApiError::gateway_timeout("request deadline exceeded")
            }
            BatchError::Cancelled { .. } => ApiError::service_unavailable("request cancelled"),
            BatchError::Store { .. } | BatchError::Worker { .. } => {
                // Key and driver detail stay in the logs.
                error!(error = %err, "batch failed");
                ApiError::internal_error("batch operation failed")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::validation_error("username and password are required")
            }
            // Unknown user and wrong password are indistinguishable to the caller.
            AuthError::InvalidCredentials | AuthError::UserNotFound { .. } => {
                ApiError::unauthorized("invalid username or password")
            }
            AuthError::InvalidToken(_) => ApiError::unauthorized("invalid token"),
            AuthError::Storage(storage) => storage.into(),
            AuthError::Token(err) => {
                error!("Token signing failed: {}", err);
                ApiError::internal_error("failed to issue token")
            }
        }
    }
}

// ============================================================
// Health
// ============================================================

async fn route_not_found() -> ApiError {
    ApiError::not_found("no such route")
}

/// Liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness check - probes the storage backend.
///
/// Returns 200 if ready, 503 if the backend is unavailable. Error details are
/// logged but not exposed in the response.
async fn readiness_check<S: DataStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(status) if status.healthy => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": {
                    "storage": "ok"
                }
            })),
        ),
        result => {
            match result {
                Err(e) => error!("Readiness check failed: storage unavailable: {}", e),
                Ok(status) => {
                    warn!(detail = ?status.message, "Readiness check failed: storage unhealthy")
                }
            }
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "checks": {
                        "storage": "unavailable"
                    }
                })),
            )
        }
    }
}

// ============================================================
// Login
// ============================================================

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response body for a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

async fn login<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBadRequest(body): JsonBadRequest<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ctx = state.request_context();
    let token = state
        .auth
        .login(&ctx, &body.username, &body.password)
        .await?;
    Ok(Json(LoginResponse { token }))
}

// ============================================================
// Batch Write / Read
// ============================================================

/// Request body for a batch write.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub data: HashMap<Key, Value>,
}

/// Response body for a successful batch write.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub status: String,
}

/// Request body for a batch read.
#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    pub keys: Vec<Key>,
}

/// Response body for a batch read. Absent keys are `null`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub data: HashMap<Key, Option<Value>>,
}

fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Result<(), ApiError> {
    for key in keys {
        validate_key(key)?;
    }
    Ok(())
}

/// Stores every pair in the request.
///
/// Not atomic: an error response may follow a partial write.
async fn write_data<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    JsonBadRequest(body): JsonBadRequest<WriteRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    validate_keys(body.data.keys())?;

    let ctx = state.request_context();
    tracing::debug!(user = %user.username, pairs = body.data.len(), "write request");
    state
        .access
        .write(&ctx, state.request_timeout, body.data)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            status: "success".to_string(),
        }),
    ))
}

async fn read_data<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    JsonBadRequest(body): JsonBadRequest<ReadRequest>,
) -> Result<Json<ReadResponse>, ApiError> {
    validate_keys(&body.keys)?;

    let ctx = state.request_context();
    tracing::debug!(user = %user.username, keys = body.keys.len(), "read request");
    let data = state
        .access
        .read(&ctx, state.request_timeout, body.keys)
        .await?;

    Ok(Json(ReadResponse { data }))
}
