//! Observability infrastructure for kvgate.
//!
//! This module provides:
//! - Prometheus metrics recorder and `/metrics` handler
//! - Structured logging configuration

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
pub use metrics::{init_metrics, metrics_handler, MetricsError, MetricsState};
