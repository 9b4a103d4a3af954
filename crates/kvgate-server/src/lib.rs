//! kvgate-server: Batch access engine and business logic
//!
//! This crate contains the business logic layer including:
//! - Batch access engine fanning key batches out over a bounded worker pool
//! - Access-layer facade that bounds each batch by a timeout
//! - Identity layer issuing and verifying bearer tokens
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               kvgate-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  handlers/   - Request handlers             │
//! │    batch/     - Batch read/write engine     │
//! │    access.rs  - Timeout-bounded facade      │
//! │    auth.rs    - Login and token checks      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig, UserSeed};
pub use handlers::access::AccessLayer;
pub use handlers::auth::{AuthError, AuthService, Claims};
pub use handlers::batch::{BatchEngine, BatchError, BatchResult, EngineConfig};
