//! kvgate-api: HTTP API layer
//!
//! This crate provides the API layer including:
//! - HTTP endpoints via Axum (login, batch write, batch read)
//! - Bearer token authentication
//! - Middleware (request ID, logging, metrics)
//! - Observability setup (structured logging, Prometheus)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 kvgate-api                   │
//! ├─────────────────────────────────────────────┤
//! │  http/          - HTTP endpoints and auth   │
//! │  middleware/    - Request ID, logging,      │
//! │                   metrics                   │
//! │  observability/ - Logging and Prometheus    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod middleware;
pub mod observability;
