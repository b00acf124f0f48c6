//! L1 Cache - Bounded Moka In-Memory Cache
//!
//! In-process cache for hot data. Entries are weighed by their byte cost and
//! the total weight is bounded by [`L1Config::max_cost_bytes`]; Moka's TinyLFU
//! policy decides admission once the budget is full. Every entry carries its
//! own TTL, and an entry past its deadline is a miss even if Moka has not
//! evicted it yet.
//!
//! L1 never fails: a rejected write just means "not cached".

use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::L1Config;

/// Fixed per-entry bookkeeping charged on top of key and value bytes
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Cache entry with TTL information
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    cost: u32,
    ttl: Duration,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Bytes, cost: u32, ttl: Duration) -> Self {
        Self {
            value,
            cost,
            ttl,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Per-entry TTL for Moka's physical eviction
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Byte cost of storing `value` under `key`
#[must_use]
pub fn entry_cost(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len() + ENTRY_OVERHEAD_BYTES) as u64
}

/// L1 Cache using Moka with cost-based admission and per-key TTL
pub struct L1Cache {
    cache: Cache<String, CacheEntry>,
    max_cost_bytes: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
    rejections: Arc<AtomicU64>,
}

impl L1Cache {
    /// Create new L1 cache bounded by `config.max_cost_bytes`
    #[must_use]
    pub fn new(config: &L1Config) -> Self {
        info!(max_cost_bytes = config.max_cost_bytes, "Initializing L1 Cache (Moka)");

        let cache = Cache::builder()
            .max_capacity(config.max_cost_bytes)
            .weigher(|_key: &String, entry: &CacheEntry| entry.cost)
            .expire_after(EntryExpiry)
            .build();

        Self {
            cache,
            max_cost_bytes: config.max_cost_bytes,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
            rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get value from L1 cache
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        match self.cache.get(key).await {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Some(_) => {
                // Past its deadline but not yet evicted by Moka
                self.cache.invalidate(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with its own TTL
    ///
    /// Returns `false` when the entry is not admitted: its cost exceeds the
    /// whole budget, or the TTL is zero. This is not an error; callers fall
    /// through to L2. Under memory pressure Moka may still decline or evict an
    /// admitted entry later, which surfaces as an ordinary miss.
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        let cost = entry_cost(key, &value);
        let weight = u32::try_from(cost).ok();

        match weight {
            Some(weight) if cost <= self.max_cost_bytes && !ttl.is_zero() => {
                self.cache
                    .insert(key.to_string(), CacheEntry::new(value, weight, ttl))
                    .await;
                self.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, cost = cost, ttl_ms = %ttl.as_millis(), "[L1] Cached key with TTL");
                true
            }
            _ => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, cost = cost, budget = self.max_cost_bytes, "[L1] Admission rejected");
                false
            }
        }
    }

    /// Remove value from cache
    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.cache.invalidate_all();
        debug!("[L1] Cleared all entries");
    }

    /// Apply Moka's pending maintenance (admission, eviction, counts)
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> L1Stats {
        L1Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
            resident_cost_bytes: self.cache.weighted_size(),
            max_cost_bytes: self.max_cost_bytes,
        }
    }
}

/// L1 statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L1Stats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Writes declined by admission control
    pub rejections: u64,
    /// Approximate until pending maintenance has run
    pub entry_count: u64,
    pub resident_cost_bytes: u64,
    pub max_cost_bytes: u64,
}

impl L1Stats {
    /// Fraction of L1 lookups that hit, in `0.0..=1.0`
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Fraction of the budget in use, in `0.0..=1.0`
    #[must_use]
    pub fn utilization(&self) -> f64 {
        ratio(self.resident_cost_bytes, self.max_cost_bytes)
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
