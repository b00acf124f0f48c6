//! L2 Cache - Remote Cache Client
//!
//! Wraps a [`RemoteBackend`] with the policies every remote call needs:
//!
//! - an explicit deadline per call ([`L2Config::operation_timeout`])
//! - bounded retries with jittered exponential backoff, for dependency
//!   failures only (a miss is never retried)
//! - latency recording into [`ConnectionHealth`] after every attempt, with a
//!   `warn` when a call exceeds the slow-operation ceiling

use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::L2Config;
use crate::error::{CacheError, CacheResult};
use crate::health::ConnectionHealth;
use crate::traits::RemoteBackend;

/// Remote cache client with timeouts, retries and health accounting
pub struct L2Cache {
    backend: Arc<dyn RemoteBackend>,
    config: L2Config,
    health: Mutex<ConnectionHealth>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
}

impl L2Cache {
    #[must_use]
    pub fn new(backend: Arc<dyn RemoteBackend>, config: L2Config) -> Self {
        Self {
            backend,
            config,
            health: Mutex::new(ConnectionHealth::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Get raw bytes; `Ok(None)` is a miss
    ///
    /// # Errors
    ///
    /// Returns a dependency failure once retries are exhausted.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = self.call("get", || self.backend.get(key)).await?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    /// Get raw bytes with the entry's remaining TTL (`None` if unknown)
    ///
    /// # Errors
    ///
    /// Returns a dependency failure once retries are exhausted.
    pub async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        let entry = self.call("get", || self.backend.get_with_ttl(key)).await?;
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(entry)
    }

    /// Store raw bytes with a TTL
    ///
    /// # Errors
    ///
    /// Returns a dependency failure once retries are exhausted.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.call("set", || self.backend.set_with_ttl(key, value, ttl))
            .await
    }

    /// Remove a key
    ///
    /// # Errors
    ///
    /// Returns a dependency failure once retries are exhausted.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.call("delete", || self.backend.remove(key)).await
    }

    /// Remove several keys, returning how many existed
    ///
    /// # Errors
    ///
    /// Returns a dependency failure once retries are exhausted.
    pub async fn delete_many(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.call("delete", || self.backend.remove_many(keys)).await
    }

    /// Remove every key matching a glob pattern
    ///
    /// # Errors
    ///
    /// Returns a dependency failure if the scan or the delete fails.
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let keys = self.call("scan", || self.backend.scan_keys(pattern)).await?;
        let removed = self.delete_many(&keys).await?;
        debug!(pattern = %pattern, removed = removed, "[L2] Removed keys matching pattern");
        Ok(removed)
    }

    /// Liveness probe with its own deadline; no retries
    ///
    /// # Errors
    ///
    /// Returns the probe failure or a [`CacheError::Timeout`].
    pub async fn probe(&self, timeout: Duration) -> CacheResult<Duration> {
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation: "ping",
                after: timeout,
            }),
        };
        let latency = started.elapsed();
        if result.is_ok() {
            self.health.lock().record_latency(latency);
        }
        result.map(|()| latency)
    }

    /// Evict idle/over-aged pooled connections
    pub async fn maintain_pool(&self) -> usize {
        self.backend
            .maintain_pool(self.config.idle_timeout, self.config.max_lifetime)
            .await
    }

    /// Snapshot of the connection health record
    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.health.lock().clone()
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health.lock().is_healthy
    }

    /// Mutate the health record under its lock
    pub(crate) fn update_health<R>(&self, f: impl FnOnce(&mut ConnectionHealth) -> R) -> R {
        f(&mut self.health.lock())
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn config(&self) -> &L2Config {
        &self.config
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> L2Stats {
        L2Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt_fn: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let deadline = self.config.operation_timeout;
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(deadline, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout {
                    operation,
                    after: deadline,
                }),
            };
            self.record_latency(operation, started.elapsed());

            match result {
                Err(e) if Self::is_retryable(&e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.backoff_delay(attempt);
                    debug!(operation, attempt, delay_ms = %delay.as_millis(), error = %e, "[L2] Retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Pool exhaustion already waited out the acquisition timeout; retrying would double it.
    fn is_retryable(err: &CacheError) -> bool {
        err.is_dependency_failure() && !matches!(err, CacheError::PoolExhausted { .. })
    }

    fn record_latency(&self, operation: &'static str, latency: Duration) {
        self.health.lock().record_latency(latency);
        if latency > self.config.slow_operation_threshold {
            warn!(
                operation,
                latency_ms = %latency.as_millis(),
                threshold_ms = %self.config.slow_operation_threshold.as_millis(),
                "[L2] Slow operation"
            );
        }
    }

    /// Exponential backoff capped at `retry_max_delay`, jittered into `[cap/2, cap]`
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let cap = self
            .config
            .retry_base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.config.retry_max_delay);
        let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
        if cap_ms < 2 {
            return cap;
        }
        Duration::from_millis(rand::thread_rng().gen_range(cap_ms / 2..=cap_ms))
    }
}

/// L2 statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L2Stats {
    pub hits: u64,
    pub misses: u64,
    /// Calls that failed after exhausting retries
    pub errors: u64,
    pub retries: u64,
}
