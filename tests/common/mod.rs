//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A fault-injecting remote backend with call counters
//! - Fast-cycling configuration for timing-sensitive tests
//! - Test data generators

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tiered_cache::{
    BreakerConfig, CacheConfig, CacheError, CacheResult, CacheSystem, CacheSystemBuilder,
    DashMapBackend, HealthConfig, L2Config, RemoteBackend, async_trait,
};

/// In-process remote store with switchable failures and latency
#[derive(Default)]
pub struct FaultyBackend {
    inner: DashMapBackend,
    pub get_calls: AtomicU32,
    pub set_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub ping_calls: AtomicU32,
    delay_ms: AtomicU64,
    read_latency_ms: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_pings: AtomicBool,
}

impl FaultyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the whole remote store being unreachable
    pub fn set_down(&self, down: bool) {
        self.fail_reads.store(down, Ordering::SeqCst);
        self.fail_writes.store(down, Ordering::SeqCst);
        self.fail_pings.store(down, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Delay returning a read after the value was taken from the store,
    /// so the answer can be stale by the time the caller sees it
    pub fn set_read_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.read_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Direct access to the stored data, bypassing counters and faults
    pub fn store(&self) -> &DashMapBackend {
        &self.inner
    }

    pub fn gets(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> u32 {
        self.set_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self, operation: &'static str, failing: &AtomicBool) -> CacheResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if failing.load(Ordering::SeqCst) {
            Err(CacheError::connection(operation, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteBackend for FaultyBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.get_with_ttl(key).await?.map(|(value, _)| value))
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("get", &self.fail_reads).await?;
        let entry = self.inner.get_with_ttl(key).await?;
        let latency = self.read_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(entry)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("set", &self.fail_writes).await?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("delete", &self.fail_writes).await?;
        self.inner.remove(key).await
    }

    async fn remove_many(&self, keys: &[String]) -> CacheResult<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("delete", &self.fail_writes).await?;
        self.inner.remove_many(keys).await
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.simulate("scan", &self.fail_reads).await?;
        self.inner.scan_keys(pattern).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate("ping", &self.fail_pings).await
    }

    fn name(&self) -> &'static str {
        "Faulty"
    }
}

/// Configuration with short timeouts, no retries and fast breaker/monitor cycles
pub fn fast_config() -> CacheConfig {
    CacheConfig {
        l2: L2Config {
            operation_timeout: Duration::from_millis(200),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            ..L2Config::default()
        },
        breaker: BreakerConfig {
            failure_threshold: 3,
            success_threshold: 1,
            open_timeout: Duration::from_millis(100),
        },
        health: HealthConfig {
            check_interval: Duration::from_millis(40),
            probe_timeout: Duration::from_millis(30),
            failure_threshold: 3,
            recovery_threshold: 1,
            skip_reads_when_unhealthy: true,
        },
        ..CacheConfig::default()
    }
}

/// Cache system over `backend`, without the background monitor
pub async fn setup_cache_system(backend: &Arc<FaultyBackend>) -> CacheSystem {
    CacheSystemBuilder::new()
        .with_config(fast_config())
        .with_remote_backend(backend.clone())
        .without_health_monitor()
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to setup cache system: {e:#}"))
}

/// Cache system over `backend` with the health monitor running
pub async fn setup_monitored_cache_system(
    backend: &Arc<FaultyBackend>,
    config: CacheConfig,
) -> CacheSystem {
    CacheSystemBuilder::new()
        .with_config(config)
        .with_remote_backend(backend.clone())
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to setup cache system: {e:#}"))
}

/// Create a test key with unique suffix, in the `entity:id` convention
pub fn test_key(name: &str) -> String {
    format!("{name}:{}", rand::random::<u32>())
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Article {
        pub id: u64,
        pub title: String,
        pub slug: String,
    }

    impl Article {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                title: format!("Article {id}"),
                slug: format!("article-{id}"),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Category {
        pub id: u64,
        pub name: String,
        pub article_ids: Vec<u64>,
    }

    impl Category {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("Category {id}"),
                article_ids: (1..=5).map(|n| id * 100 + n).collect(),
            }
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{Duration, sleep};

    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Assert that cache manager stats meet expectations
#[macro_export]
macro_rules! assert_cache_stats {
    ($cache:expr, $field:ident == $value:expr) => {
        let stats = $cache.cache_manager().stats();
        assert_eq!(
            stats.$field,
            $value,
            "Expected {} == {}, got {}",
            stringify!($field),
            $value,
            stats.$field
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("article");
        let key2 = test_key("article");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("article:"));
    }

    #[test]
    fn test_data_generation() {
        let article = test_data::Article::new(123);
        assert_eq!(article.title, "Article 123");
        assert_eq!(article.slug, "article-123");
    }
}
