//! Batch access engine.
//!
//! Turns a batch of keys (or key/value pairs) into concurrent point
//! operations against a [`PointStore`](kvgate_storage::PointStore):
//!
//! 1. **Bounded fan-out**: at most `workers` point operations run at once,
//!    pulling items from a shared closable queue
//! 2. **Single-owner fan-in**: workers send outcomes over one channel and
//!    only the caller assembles the result
//! 3. **First error wins**: the first failure closes the queue and becomes
//!    the batch error
//!
//! Every point operation receives the caller's request context, so
//! cancellation and deadline expiry reach all in-flight work.

mod handler;
mod queue;
mod types;

pub use handler::BatchEngine;
pub use types::{
    BatchError, BatchResult, EngineConfig, DEFAULT_WORKERS, MAX_WORKERS, READ_OP, WRITE_OP,
};
