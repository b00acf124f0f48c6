//! Basic Usage Example
//!
//! Demonstrates simple cache operations: set, get, typed values, pattern
//! invalidation and statistics.
//!
//! Uses Redis at `REDIS_URL` when reachable and falls back to the in-process
//! backend otherwise.
//!
//! Run with: cargo run --example basic_usage

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::{
    CacheConfig, CacheSystem, CacheSystemBuilder, DashMapBackend, TtlOptions, classify_key,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Article {
    id: u64,
    title: String,
    tags: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Tiered Cache: Basic Usage ===\n");

    // 1. Initialize cache system (L1 Moka + L2 Redis, or in-process L2)
    let config = CacheConfig::from_env()?;
    let cache = match CacheSystem::new(config.clone()).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Redis unavailable, using in-process L2");
            CacheSystemBuilder::new()
                .with_config(config)
                .with_remote_backend(Arc::new(DashMapBackend::new()))
                .build()
                .await?
        }
    };
    let manager = cache.cache_manager();

    // 2. Raw bytes with explicit per-tier TTLs
    manager
        .set(
            "article:1",
            b"A".to_vec(),
            TtlOptions::explicit(Duration::from_secs(300), Duration::from_secs(3600)),
        )
        .await?;
    if let Some(bytes) = manager.get("article:1").await {
        println!("article:1 -> {:?}", String::from_utf8_lossy(&bytes));
    }

    // 3. Typed values with TTLs picked from the key shape
    let article = Article {
        id: 42,
        title: "Caching in practice".to_string(),
        tags: vec!["rust".to_string(), "cache".to_string()],
    };
    for key in ["article:42", "articles:list:page:1", "categories:all", "articles:count"] {
        println!("{key:<22} classified as {:?}", classify_key(key));
    }
    manager.set_typed("article:42", &article, TtlOptions::heuristic()).await?;
    let cached: Option<Article> = manager.get_typed("article:42").await?;
    println!("\nTyped read: {cached:?}");

    // 4. Compute on miss
    let listing: Vec<u64> = manager
        .get_or_compute_typed("articles:list:page:1", TtlOptions::heuristic(), || async {
            println!("Computing listing from the database...");
            Ok(vec![42, 41, 40])
        })
        .await?;
    println!("Listing: {listing:?}");

    // 5. Pattern invalidation
    let removed = manager.delete_pattern("articles:list:*").await?;
    println!("Invalidated {removed} listing key(s)\n");

    // 6. Statistics
    let stats = manager.stats();
    println!("=== Cache Statistics ===");
    println!("Total requests: {}", stats.total_requests);
    println!("L1 hits: {}", stats.l1_hits);
    println!("L2 hits: {}", stats.l2_hits);
    println!("Misses: {}", stats.misses);
    println!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
    println!("{}", manager.health_report().summary());

    cache.shutdown().await
}
