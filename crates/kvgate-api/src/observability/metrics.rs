//! Prometheus metrics infrastructure.
//!
//! Metrics are recorded through the `metrics` facade across all crates and
//! rendered here with `metrics-exporter-prometheus`.
//!
//! # Metrics Exposed
//!
//! - `kvgate_http_requests_total` / `kvgate_http_request_duration_seconds` - per route
//! - `kvgate_http_unauthorized_total` - rejected credentials and tokens
//! - `kvgate_batch_operations_total` / `kvgate_batch_duration_seconds` /
//!   `kvgate_batch_size` - batch engine outcomes
//! - `kvgate_storage_query_duration_seconds` / `kvgate_storage_query_timeout_total` -
//!   PostgreSQL point queries

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder.
///
/// Must be called once at startup, before any metric is recorded.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    describe_metrics();

    Ok(MetricsState::new(handle))
}

fn describe_metrics() {
    metrics::describe_counter!("kvgate_http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "kvgate_http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
    metrics::describe_counter!(
        "kvgate_http_unauthorized_total",
        "HTTP requests rejected with 401"
    );

    metrics::describe_counter!(
        "kvgate_batch_operations_total",
        "Batches processed by op and status"
    );
    metrics::describe_histogram!(
        "kvgate_batch_duration_seconds",
        metrics::Unit::Seconds,
        "Batch duration in seconds by op"
    );
    metrics::describe_histogram!("kvgate_batch_size", "Items per batch by op");

    metrics::describe_histogram!(
        "kvgate_storage_query_duration_seconds",
        metrics::Unit::Seconds,
        "Storage query duration in seconds by operation and status"
    );
    metrics::describe_counter!(
        "kvgate_storage_query_timeout_total",
        "Storage queries that hit their per-query timeout"
    );
}

/// Prometheus exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}
