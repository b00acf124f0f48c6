//! Benchmarks for basic cache operations
//!
//! This benchmark suite measures the performance of:
//! - L1+L2 write operations for different value sizes
//! - L1 hit, L2 hit (with promotion) and total-miss reads
//! - Key classification used for TTL selection
//!
//! L2 is the in-process `DashMapBackend`, so the numbers isolate the cache
//! machinery from network latency.

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::{
    CacheConfig, CacheSystem, CacheSystemBuilder, DashMapBackend, RemoteBackend, TtlOptions,
    classify_key,
};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Setup cache system for benchmarks
fn setup_cache() -> (CacheSystem, Arc<DashMapBackend>, Runtime) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let backend = Arc::new(DashMapBackend::new());
    let cache = rt.block_on(async {
        CacheSystemBuilder::new()
            .with_config(CacheConfig::default())
            .with_remote_backend(backend.clone())
            .without_health_monitor()
            .build()
            .await
            .unwrap_or_else(|e| panic!("Failed to create cache system: {e}"))
    });
    (cache, backend, rt)
}

/// Benchmark L1 + L2 cache write operations
fn bench_cache_set(c: &mut Criterion) {
    let (cache, _backend, rt) = setup_cache();

    let mut group = c.benchmark_group("cache_set");
    group.measurement_time(Duration::from_secs(10));

    for size in &[100, 1024, 10240, 102_400] {
        let data = Bytes::from(vec![b'x'; *size]);

        group.bench_with_input(BenchmarkId::new("heuristic_ttl", size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let key = format!("article:{}", rand::random::<u32>());
                    cache
                        .cache_manager()
                        .set(&key, black_box(data.clone()), TtlOptions::heuristic())
                        .await
                        .unwrap_or_else(|_| panic!("Failed to set cache"));
                });
            });
        });
    }

    group.finish();
}

/// Benchmark L1 cache hit performance
fn bench_l1_hit(c: &mut Criterion) {
    let (cache, _backend, rt) = setup_cache();

    rt.block_on(async {
        for i in 0..100 {
            let key = format!("bench:l1:{i}");
            cache
                .cache_manager()
                .set(&key, vec![1u8; 1024], TtlOptions::uniform(Duration::from_secs(300)))
                .await
                .unwrap_or_else(|_| panic!("Failed to set cache"));
        }
    });

    c.bench_function("l1_cache_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:l1:{}", rand::random::<u8>() % 100);
                black_box(cache.cache_manager().get(&key).await);
            });
        });
    });
}

/// Benchmark L2 cache hit performance (L1 miss, then promotion)
fn bench_l2_hit(c: &mut Criterion) {
    let (cache, backend, rt) = setup_cache();

    // Pre-populate L2 only
    rt.block_on(async {
        for i in 0..100 {
            let key = format!("bench:l2:{i}");
            backend
                .set_with_ttl(&key, &[2u8; 1024], Duration::from_secs(300))
                .await
                .unwrap_or_else(|_| panic!("Failed to set cache"));
        }
    });

    c.bench_function("l2_cache_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:l2:{}", rand::random::<u8>() % 100);
                // Drop the promoted copy to force L2 access
                cache.cache_manager().l1().delete(&key).await;
                black_box(cache.cache_manager().get(&key).await);
            });
        });
    });
}

/// Benchmark cache miss performance
fn bench_cache_miss(c: &mut Criterion) {
    let (cache, _backend, rt) = setup_cache();

    c.bench_function("cache_miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:miss:{}", rand::random::<u32>());
                black_box(cache.cache_manager().get(&key).await);
            });
        });
    });
}

/// Benchmark key classification
fn bench_classify_key(c: &mut Criterion) {
    let keys = [
        "article:42",
        "articles:list:page:3",
        "categories:all",
        "articles:trending",
        "session:abc:def:ghi",
    ];

    c.bench_function("classify_key", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(classify_key(black_box(key)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_cache_set,
    bench_l1_hit,
    bench_l2_hit,
    bench_cache_miss,
    bench_classify_key
);
criterion_main!(benches);
