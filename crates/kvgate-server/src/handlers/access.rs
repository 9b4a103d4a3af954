//! Access-layer facade over the batch engine.
//!
//! Each call derives a child of the caller's context bounded by the given
//! timeout, runs the batch and returns the engine's error unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kvgate_storage::{Key, PointStore, RequestContext, Value};
use tracing::{error, info, instrument};

use super::batch::{BatchEngine, BatchResult};

/// Entry point for batch reads and writes.
pub struct AccessLayer<S: PointStore> {
    engine: BatchEngine<S>,
}

impl<S: PointStore> Clone for AccessLayer<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S: PointStore> AccessLayer<S> {
    /// Creates a facade over a default-configured engine.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_engine(BatchEngine::new(store))
    }

    pub fn with_engine(engine: BatchEngine<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &BatchEngine<S> {
        &self.engine
    }

    /// Stores every pair within `timeout`.
    ///
    /// Not atomic: on error, some pairs may already be stored.
    #[instrument(skip_all, fields(op = "access.write", pairs = pairs.len()))]
    pub async fn write(
        &self,
        ctx: &RequestContext,
        timeout: Duration,
        pairs: HashMap<Key, Value>,
    ) -> BatchResult<()> {
        let ctx = ctx.with_timeout(timeout);
        info!("writing batch");

        match self.engine.write_batch(&ctx, pairs).await {
            Ok(()) => {
                info!("batch written");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "batch write failed");
                Err(err)
            }
        }
    }

    /// Fetches every key within `timeout`. Absent keys map to `None`.
    #[instrument(skip_all, fields(op = "access.read", keys = keys.len()))]
    pub async fn read(
        &self,
        ctx: &RequestContext,
        timeout: Duration,
        keys: Vec<Key>,
    ) -> BatchResult<HashMap<Key, Option<Value>>> {
        let ctx = ctx.with_timeout(timeout);
        info!("reading batch");

        match self.engine.read_batch(&ctx, keys).await {
            Ok(data) => {
                info!(found = data.values().filter(|v| v.is_some()).count(), "batch read");
                Ok(data)
            }
            Err(err) => {
                error!(error = %err, "batch read failed");
                Err(err)
            }
        }
    }
}
