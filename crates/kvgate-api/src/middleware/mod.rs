//! API middleware.
//!
//! Includes:
//! - Request ID assignment and propagation
//! - Request logging with a per-request span
//! - HTTP metrics collection
//! - CORS configuration

mod logging;
mod metrics;
mod request_id;

pub use logging::RequestLoggingLayer;
pub use metrics::{MetricsLayer, MetricsSnapshot, RequestMetrics};
pub use request_id::{RequestId, RequestIdLayer, MAX_REQUEST_ID_LEN, REQUEST_ID_HEADER};

use tower_http::cors::{Any, CorsLayer};

/// Creates a CORS layer with permissive settings for development.
///
/// In production, you should restrict origins, methods, and headers.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
