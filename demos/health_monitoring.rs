//! Health Monitoring Example
//!
//! Runs the background health monitor against an in-process L2 that goes
//! down for a few seconds, and prints the health report as the cache
//! degrades and recovers.
//!
//! Run with: cargo run --example health_monitoring

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tiered_cache::{
    CacheConfig, CacheError, CacheResult, CacheSystemBuilder, DashMapBackend, HealthConfig,
    RemoteBackend, TtlOptions, async_trait,
};
use tracing_subscriber::EnvFilter;

/// In-process store that can be switched off
#[derive(Default)]
struct SwitchableStore {
    inner: DashMapBackend,
    down: AtomicBool,
}

impl SwitchableStore {
    fn check(&self, operation: &'static str) -> CacheResult<()> {
        if self.down.load(Ordering::Relaxed) {
            Err(CacheError::connection(operation, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteBackend for SwitchableStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check("get")?;
        self.inner.get(key).await
    }
    async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        self.check("get")?;
        self.inner.get_with_ttl(key).await
    }
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.check("set")?;
        self.inner.set_with_ttl(key, value, ttl).await
    }
    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.check("delete")?;
        self.inner.remove(key).await
    }
    async fn remove_many(&self, keys: &[String]) -> CacheResult<usize> {
        self.check("delete")?;
        self.inner.remove_many(keys).await
    }
    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.check("scan")?;
        self.inner.scan_keys(pattern).await
    }
    async fn ping(&self) -> CacheResult<()> {
        self.check("ping")
    }
    fn name(&self) -> &'static str {
        "Switchable"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Tiered Cache: Health Monitoring ===\n");

    let store = Arc::new(SwitchableStore::default());
    let config = CacheConfig {
        health: HealthConfig {
            check_interval: Duration::from_millis(500),
            probe_timeout: Duration::from_millis(200),
            ..HealthConfig::default()
        },
        ..CacheConfig::default()
    };
    let cache = CacheSystemBuilder::new()
        .with_config(config)
        .with_remote_backend(store.clone())
        .build()
        .await?;
    let manager = cache.cache_manager();

    for id in 0..20 {
        manager
            .set(&format!("article:{id}"), format!("body {id}").into_bytes(), TtlOptions::heuristic())
            .await?;
    }

    for tick in 1..=12 {
        match tick {
            4 => {
                println!(">>> L2 goes down");
                store.down.store(true, Ordering::Relaxed);
            }
            9 => {
                println!(">>> L2 comes back");
                store.down.store(false, Ordering::Relaxed);
                manager.reset_circuit_breakers();
            }
            _ => {}
        }

        // Mix of L1 hits and misses that need L2
        for id in 0..40 {
            manager.get(&format!("article:{id}")).await;
        }
        if let Err(e) = manager
            .set(&format!("article:{}", 100 + tick), b"fresh".to_vec(), TtlOptions::heuristic())
            .await
        {
            println!("   set failed: {e}");
        }

        let report = manager.health_report();
        println!("Tick #{tick}: {}", report.summary());
        for breaker in &report.breakers {
            println!("   breaker {:<6} {:?}", breaker.operation, breaker.state);
        }
        for advice in &report.recommendations {
            println!("   - {advice}");
        }
        println!();

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    cache.shutdown().await
}
