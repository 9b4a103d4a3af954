//! HTTP metrics middleware.
//!
//! Requests are recorded through the `metrics` facade, which the binary
//! connects to Prometheus via `metrics-exporter-prometheus`.
//!
//! # Metrics Emitted
//!
//! - `kvgate_http_requests_total` - Counter with labels: method, path, status_class
//! - `kvgate_http_request_duration_seconds` - Histogram with labels: method, path, status_class
//! - `kvgate_http_unauthorized_total` - Counter of 401 responses, labelled by path

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use axum::{
    extract::MatchedPath,
    http::{Request, Response, StatusCode},
};
use tower::{Layer, Service};

/// Point-in-time view of [`RequestMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub unauthorized: u64,
    pub server_errors: u64,
}

/// Request counters kept alongside the facade so tests and probes can read
/// them back without a recorder installed.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    unauthorized: AtomicU64,
    server_errors: AtomicU64,
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished request.
    pub fn record(&self, method: &str, path: &str, status: StatusCode, duration: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let class = status_class(status);
        match class {
            "2xx" => self.success.fetch_add(1, Ordering::Relaxed),
            "4xx" => self.client_errors.fetch_add(1, Ordering::Relaxed),
            "5xx" => self.server_errors.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };

        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_class", class.to_string()),
        ];
        metrics::counter!("kvgate_http_requests_total", &labels).increment(1);
        metrics::histogram!("kvgate_http_request_duration_seconds", &labels)
            .record(duration.as_secs_f64());

        if status == StatusCode::UNAUTHORIZED {
            self.unauthorized.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("kvgate_http_unauthorized_total", "path" => path.to_string())
                .increment(1);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

/// Layer that records request metrics.
#[derive(Clone, Default)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    /// Creates a layer recording into `metrics`.
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service that records metrics for each request.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let method = request.method().to_string();
        // Route pattern keeps label cardinality bounded; unmatched paths share one label.
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;
            metrics.record(&method, &path, response.status(), start.elapsed());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(StatusCode::CREATED), "2xx");
        assert_eq!(status_class(StatusCode::UNAUTHORIZED), "4xx");
        assert_eq!(status_class(StatusCode::GATEWAY_TIMEOUT), "5xx");
    }

    #[test]
    fn test_record_counts_by_class() {
        let metrics = RequestMetrics::new();
        metrics.record("POST", "/api/login", StatusCode::OK, Duration::from_millis(1));
        metrics.record("POST", "/api/write", StatusCode::CREATED, Duration::from_millis(3));
        metrics.record("POST", "/api/read", StatusCode::UNAUTHORIZED, Duration::ZERO);
        metrics.record("POST", "/api/read", StatusCode::GATEWAY_TIMEOUT, Duration::ZERO);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                requests: 4,
                success: 2,
                client_errors: 1,
                unauthorized: 1,
                server_errors: 1,
            }
        );
    }

    #[test]
    fn test_record_without_recorder_is_a_no_op_for_the_facade() {
        let metrics = RequestMetrics::new();
        metrics.record("GET", "/health", StatusCode::OK, Duration::from_micros(10));
        assert_eq!(metrics.snapshot().requests, 1);
    }
}
