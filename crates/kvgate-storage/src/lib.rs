//! kvgate-storage: Storage abstraction layer
//!
//! This crate provides the point-operation drivers that the batch access
//! engine fans out over, including:
//! - The key/value data model (`Key`, `Value`, `Pair`, `User`)
//! - `RequestContext` for cancellation and deadlines
//! - `PointStore` / `UserStore` / `DataStore` trait definitions
//! - In-memory implementation for tests and local runs
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               kvgate-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  context.rs  - Cancellation + deadline      │
//! │  traits.rs   - Driver trait definitions     │
//! │  memory.rs   - In-memory implementation     │
//! │  postgres.rs - PostgreSQL implementation    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use context::{Interrupt, RequestContext};
pub use error::{HealthStatus, StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use postgres::{PostgresConfig, PostgresDataStore};
pub use traits::{
    validate_key, DataStore, Key, Pair, PointStore, User, UserStore, Value, MAX_KEY_LENGTH,
};
