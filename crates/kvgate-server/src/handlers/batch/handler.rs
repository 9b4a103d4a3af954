//! Batch access engine implementation.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use kvgate_storage::{Key, Pair, PointStore, RequestContext, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::queue::WorkQueue;
use super::types::{BatchError, BatchResult, EngineConfig, Outcome, READ_OP, WRITE_OP};

/// Engine for batch reads and writes over a single-key store.
///
/// Each call spreads its items over at most `workers` concurrent tasks that
/// pull from a shared queue and report over one channel. Only the calling
/// task assembles the result, so no lock guards the result map.
///
/// The first failing item decides the outcome of the batch: the queue is
/// closed so no new point operations start, operations already in flight
/// are allowed to finish, and their results are discarded.
///
/// Writes are not atomic. A failed `write_batch` may have stored any subset
/// of its pairs.
pub struct BatchEngine<S: PointStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: PointStore> Clone for BatchEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: PointStore> BatchEngine<S> {
    /// Creates an engine with the default worker count.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Creates an engine with explicit settings.
    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config: EngineConfig::new(config.workers),
        }
    }

    /// Maximum number of concurrent point operations per batch.
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetches every key in `keys`.
    ///
    /// On success the map holds one entry per distinct key; a key absent
    /// from the store maps to `None`. Every occurrence of a duplicated key is
    /// looked up on its own and the entries collapse in the map.
    pub async fn read_batch(
        &self,
        ctx: &RequestContext,
        keys: Vec<Key>,
    ) -> BatchResult<HashMap<Key, Option<Value>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let start = Instant::now();
        let size = keys.len();
        let mut data = HashMap::with_capacity(size);

        let result = self
            .dispatch(
                READ_OP,
                ctx,
                keys,
                |store: Arc<S>, ctx: RequestContext, key: Key| async move {
                    match store.fetch_one(&ctx, &key).await {
                        Ok(value) => Outcome::Fetched { key, value },
                        Err(source) => {
                            Outcome::Failed(BatchError::from_storage(READ_OP, key, source))
                        }
                    }
                },
                |outcome| {
                    if let Outcome::Fetched { key, value } = outcome {
                        data.insert(key, value);
                    }
                },
            )
            .await;

        record_batch(READ_OP, &result, size, start);
        result.map(|()| data)
    }

    /// Stores every pair in `pairs`, replacing existing values.
    ///
    /// Not atomic: on error, pairs already stored stay stored and pairs not
    /// yet started are skipped.
    pub async fn write_batch(
        &self,
        ctx: &RequestContext,
        pairs: HashMap<Key, Value>,
    ) -> BatchResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let size = pairs.len();
        let items: Vec<Pair> = pairs
            .into_iter()
            .map(|(key, value)| Pair { key, value })
            .collect();

        let result = self
            .dispatch(
                WRITE_OP,
                ctx,
                items,
                |store: Arc<S>, ctx: RequestContext, pair: Pair| async move {
                    match store.store_one(&ctx, &pair.key, pair.value).await {
                        Ok(()) => Outcome::Stored,
                        Err(source) => {
                            Outcome::Failed(BatchError::from_storage(WRITE_OP, pair.key, source))
                        }
                    }
                },
                |_| {},
            )
            .await;

        record_batch(WRITE_OP, &result, size, start);
        result
    }

    /// Runs `point_op` for every item on a bounded set of workers and feeds
    /// successful outcomes to `on_success` until the batch completes or fails.
    async fn dispatch<T, F, Fut>(
        &self,
        op: &'static str,
        ctx: &RequestContext,
        items: Vec<T>,
        point_op: F,
        mut on_success: impl FnMut(Outcome),
    ) -> BatchResult<()>
    where
        T: Send + 'static,
        F: Fn(Arc<S>, RequestContext, T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let worker_count = self.config.workers.min(items.len());
        let queue = Arc::new(WorkQueue::new(items));
        let (tx, mut rx) = mpsc::channel::<Outcome>(worker_count);

        debug!(op, items = queue.len(), workers = worker_count, "dispatching batch");

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let store = Arc::clone(&self.store);
            let ctx = ctx.clone();
            let point_op = point_op.clone();

            workers.spawn(async move {
                while let Some(item) = queue.pop() {
                    // A panic fails the batch like any other item error.
                    let attempt =
                        AssertUnwindSafe(point_op(Arc::clone(&store), ctx.clone(), item))
                            .catch_unwind();
                    let outcome = tokio::select! {
                        biased;
                        interrupt = ctx.done() => {
                            Outcome::Failed(BatchError::interrupted(op, interrupt))
                        }
                        caught = attempt => caught.unwrap_or_else(|payload| {
                            Outcome::Failed(BatchError::Worker {
                                op,
                                message: panic_message(payload.as_ref()),
                            })
                        }),
                    };

                    let failed = matches!(outcome, Outcome::Failed(_));
                    if failed {
                        queue.close();
                    }
                    if tx.send(outcome).await.is_err() || failed {
                        break;
                    }
                }
            });
        }
        // The channel closes once the last worker drops its sender.
        drop(tx);

        let mut first_error: Option<BatchError> = None;
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    None => break,
                    Some(Outcome::Failed(err)) => {
                        queue.close();
                        if first_error.is_none() {
                            warn!(op, key = err.key(), error = %err, "batch item failed");
                            first_error = Some(err);
                        } else {
                            debug!(op, error = %err, "discarding failure after first error");
                        }
                    }
                    Some(outcome) => {
                        if first_error.is_none() {
                            on_success(outcome);
                        }
                    }
                },
                interrupt = ctx.done(), if first_error.is_none() => {
                    queue.close();
                    let err = BatchError::interrupted(op, interrupt);
                    warn!(op, error = %err, "batch interrupted");
                    first_error = Some(err);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(join_err) = joined {
                if first_error.is_none() {
                    warn!(op, error = %join_err, "batch worker failed");
                    first_error = Some(BatchError::Worker {
                        op,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload");
    format!("point operation panicked: {detail}")
}

/// Records batch outcome metrics.
///
/// # Metrics
/// - `kvgate_batch_operations_total` - Counter of batches by op and status
/// - `kvgate_batch_duration_seconds` - Histogram of batch durations
/// - `kvgate_batch_size` - Histogram of items per batch
fn record_batch<T>(op: &'static str, result: &BatchResult<T>, size: usize, start: Instant) {
    let status = match result {
        Ok(_) => "success",
        Err(err) if err.is_timeout() => "timeout",
        Err(err) if err.is_cancelled() => "cancelled",
        Err(_) => "error",
    };

    metrics::counter!("kvgate_batch_operations_total", "op" => op, "status" => status).increment(1);
    metrics::histogram!("kvgate_batch_duration_seconds", "op" => op)
        .record(start.elapsed().as_secs_f64());
    metrics::histogram!("kvgate_batch_size", "op" => op).record(size as f64);
}
