//! Performance benchmarks for BatchEngine.
//!
//! Run with: cargo bench -p kvgate-server
//!
//! These benchmarks measure:
//! - Read throughput against an in-memory store for growing batch sizes
//! - How worker count hides per-key latency of a remote store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

use kvgate_server::handlers::batch::{BatchEngine, EngineConfig};
use kvgate_storage::{
    Key, MemoryDataStore, PointStore, RequestContext, StorageResult, Value,
};

// =============================================================================
// Benchmark-specific store
// =============================================================================

/// Memory store with a fixed round-trip delay per point operation.
struct RemoteLikeStore {
    inner: MemoryDataStore,
    round_trip: Duration,
}

#[async_trait]
impl PointStore for RemoteLikeStore {
    async fn fetch_one(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<Value>> {
        tokio::time::sleep(self.round_trip).await;
        self.inner.fetch_one(ctx, key).await
    }

    async fn store_one(&self, ctx: &RequestContext, key: &str, value: Value) -> StorageResult<()> {
        tokio::time::sleep(self.round_trip).await;
        self.inner.store_one(ctx, key, value).await
    }
}

fn seeded_memory_store(count: usize) -> MemoryDataStore {
    let rt = Runtime::new().unwrap();
    let store = MemoryDataStore::new();
    let ctx = RequestContext::background();
    rt.block_on(async {
        for i in 0..count {
            store
                .store_one(&ctx, &format!("key-{i}"), json!({"n": i}))
                .await
                .unwrap();
        }
    });
    store
}

fn keys(count: usize) -> Vec<Key> {
    (0..count).map(|i| format!("key-{i}")).collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_read_batch_sizes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = BatchEngine::new(Arc::new(seeded_memory_store(1000)));
    let ctx = RequestContext::background();

    let mut group = c.benchmark_group("read_batch_memory");

    for batch_size in [10, 100, 1000] {
        let batch = keys(batch_size);
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch,
            |b, batch| {
                b.to_async(&rt).iter(|| async {
                    let result = engine.read_batch(&ctx, black_box(batch.clone())).await;
                    black_box(result)
                })
            },
        );
    }

    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(RemoteLikeStore {
        inner: seeded_memory_store(100),
        round_trip: Duration::from_micros(200),
    });
    let ctx = RequestContext::background();
    let pairs: HashMap<Key, Value> = (0..100).map(|i| (format!("key-{i}"), json!(i))).collect();

    let mut group = c.benchmark_group("write_batch_worker_scaling");
    group.throughput(Throughput::Elements(pairs.len() as u64));

    for workers in [1, 4, 16] {
        let engine = BatchEngine::with_config(Arc::clone(&store), EngineConfig::new(workers));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &pairs, |b, pairs| {
            b.to_async(&rt).iter(|| async {
                let result = engine.write_batch(&ctx, black_box(pairs.clone())).await;
                black_box(result)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_read_batch_sizes, bench_worker_scaling);
criterion_main!(benches);
