//! Cache Manager - Unified Cache Operations
//!
//! Orchestrates L1 and L2 with intelligent fallback:
//!
//! ```text
//! get:  L1 ──hit──> return
//!        └─miss──> [L2 unhealthy? -> miss]
//!                  Deduplicator -> get breaker -> L2 ──hit──> promote to L1, return
//!                                                   └─miss/error──> miss
//! set:  L1 (best effort) + set breaker -> L2 (errors surfaced)
//! ```
//!
//! The manager holds no lock on the hot path; each tier handles its own
//! concurrency and all counters are atomics.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::circuit_breaker::BreakerSet;
use crate::codecs::JsonCodec;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::l1_cache::{L1Cache, ratio};
use crate::l2_cache::L2Cache;
use crate::report::HealthReport;
use crate::singleflight::Deduplicator;
use crate::traits::CacheCodec;
use crate::ttl_policy::{PatternScope, TtlBand, TtlOptions, TtlPolicy, classify_pattern};

/// Cache Manager - Unified operations across L1 and L2
pub struct CacheManager {
    l1: Arc<L1Cache>,
    l2: Arc<L2Cache>,
    breakers: BreakerSet,
    /// Collapses concurrent L2 reads per key
    lookups: Deduplicator<Option<Bytes>>,
    /// Collapses concurrent origin computations per key
    computations: Deduplicator<Bytes>,
    ttl_policy: TtlPolicy,
    tier_defaults: TtlBand,
    skip_reads_when_unhealthy: bool,
    codec: JsonCodec,
    // Statistics
    total_requests: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    l2_skipped: AtomicU64,
    l2_read_errors: AtomicU64,
    promotions: AtomicU64,
}

impl CacheManager {
    /// Create a manager over already-constructed tiers
    #[must_use]
    pub fn new(l1: Arc<L1Cache>, l2: Arc<L2Cache>, config: &CacheConfig) -> Self {
        info!(
            l2_backend = l2.backend_name(),
            failure_threshold = config.breaker.failure_threshold,
            "Initializing Cache Manager"
        );

        Self {
            l1,
            l2,
            breakers: BreakerSet::new(config.breaker),
            lookups: Deduplicator::new(),
            computations: Deduplicator::new(),
            ttl_policy: config.ttl,
            tier_defaults: TtlBand::new(config.l1.default_ttl, config.l2.default_ttl),
            skip_reads_when_unhealthy: config.health.skip_reads_when_unhealthy,
            codec: JsonCodec,
            total_requests: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l2_skipped: AtomicU64::new(0),
            l2_read_errors: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Get value from cache (L1 first, then L2 with promotion)
    ///
    /// Concurrent misses for the same key share one L2 round trip. L2
    /// failures, including an open breaker, are absorbed into a miss; the
    /// caller falls back to its origin.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        // Fast path: L1
        if let Some(value) = self.l1.get(key).await {
            self.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if self.skip_reads_when_unhealthy && !self.l2.is_healthy() {
            self.l2_skipped.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "[L2] Unhealthy, skipping read");
            return None;
        }

        let (result, was_shared) = self
            .lookups
            .run(key, || self.fetch_and_promote(key))
            .await;

        match result {
            Ok(Some(value)) => {
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                if was_shared {
                    debug!(key = %key, "[L2] Served from in-flight lookup");
                }
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.l2_read_errors.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                if e.is_circuit_open() {
                    debug!(key = %key, "[L2] Read short-circuited, treating as miss");
                } else {
                    warn!(key = %key, error = %e, "[L2] Read failed, treating as miss");
                }
                None
            }
        }
    }

    /// L2 read run by the singleflight leader; promotes hits into L1
    ///
    /// The L1 copy never outlives the L2 entry it was read from.
    async fn fetch_and_promote(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let Some((raw, remaining)) = self
            .breakers
            .get
            .execute(|| self.l2.get_with_ttl(key))
            .await?
        else {
            return Ok(None);
        };
        let value = Bytes::from(raw);

        let heuristic = self
            .ttl_policy
            .resolve(key, TtlOptions::heuristic(), self.tier_defaults)
            .l1;
        let ttl = remaining.map_or(heuristic, |remaining| heuristic.min(remaining));
        if ttl.is_zero() {
            return Ok(Some(value));
        }
        if self.l1.set(key, value.clone(), ttl).await {
            self.promotions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, ttl_ms = %ttl.as_millis(), "[L2->L1] Promoted");
        }
        Ok(Some(value))
    }

    /// Store a value in both tiers
    ///
    /// TTLs come from `options`, else the key heuristics, else the tier
    /// defaults. The L1 write is best effort; an L1 admission rejection is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns the L2 failure (or [`CacheError::CircuitOpen`]). The L1 copy,
    /// if admitted, is kept.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>, options: TtlOptions) -> CacheResult<()> {
        let value = value.into();
        let band = self.ttl_policy.resolve(key, options, self.tier_defaults);

        if !self.l1.set(key, value.clone(), band.l1).await {
            debug!(key = %key, "[L1] Not admitted, relying on L2");
        }

        self.breakers
            .set
            .execute(|| self.l2.set(key, &value, band.l2))
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "[L2] Set failed"))?;

        debug!(
            key = %key,
            l1_ttl_ms = %band.l1.as_millis(),
            l2_ttl_ms = %band.l2.as_millis(),
            "[L1+L2] Cached"
        );
        Ok(())
    }

    /// Remove a key from both tiers
    ///
    /// # Errors
    ///
    /// Returns the L2 failure; the L1 entry is removed regardless.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.l1.delete(key).await;
        self.breakers
            .delete
            .execute(|| self.l2.delete(key))
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "[L2] Delete failed"))
    }

    /// Remove every L2 key matching a glob pattern
    ///
    /// L1 has no pattern index: a broad pattern (see
    /// [`classify_pattern`]) clears all of L1, a narrow one leaves L1 as is and
    /// matching L1 entries stay readable until their L1 TTL runs out.
    ///
    /// Returns the number of L2 keys removed.
    ///
    /// # Errors
    ///
    /// Returns the L2 scan or delete failure.
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize> {
        match classify_pattern(pattern) {
            PatternScope::Broad => {
                self.l1.clear();
                info!(pattern = %pattern, "[L1] Broad pattern invalidation, cleared L1");
            }
            PatternScope::Narrow => {
                debug!(pattern = %pattern, "[L1] Narrow pattern, L1 left to expire");
            }
        }

        let removed = self
            .breakers
            .delete
            .execute(|| self.l2.delete_pattern(pattern))
            .await
            .inspect_err(|e| warn!(pattern = %pattern, error = %e, "[L2] Pattern delete failed"))?;

        info!(pattern = %pattern, removed = removed, "Pattern invalidation complete");
        Ok(removed)
    }

    /// Remove several keys from both tiers in one L2 round trip
    ///
    /// # Errors
    ///
    /// Returns the L2 failure; the L1 entries are removed regardless.
    pub async fn bulk_delete(&self, keys: &[String]) -> CacheResult<usize> {
        for key in keys {
            self.l1.delete(key).await;
        }
        self.breakers
            .delete
            .execute(|| self.l2.delete_many(keys))
            .await
            .inspect_err(|e| warn!(count = keys.len(), error = %e, "[L2] Bulk delete failed"))
    }

    /// Get and decode a typed value
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the cached bytes do not decode as `T`.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await {
            Some(bytes) => self.codec.deserialize(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and store a typed value
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] or the L2 failure.
    pub async fn set_typed<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: TtlOptions,
    ) -> CacheResult<()> {
        let bytes = self.codec.serialize(value)?;
        self.set(key, bytes, options).await
    }

    /// Get a typed value, computing and caching it on a total miss
    ///
    /// Among concurrent callers for the same key only one runs `compute`; the
    /// others receive its result. A cached value that no longer decodes as `T`
    /// is recomputed. A failed cache write after a successful compute is
    /// logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute`, or [`CacheError::Serialization`].
    pub async fn get_or_compute_typed<T, F, Fut>(
        &self,
        key: &str,
        options: TtlOptions,
        compute: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        if let Some(bytes) = self.get(key).await {
            match self.codec.deserialize::<T>(&bytes) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached value does not decode, recomputing");
                }
            }
        }

        let (result, was_shared) = self
            .computations
            .run(key, || async {
                // A previous flight may have filled the cache after our miss above
                if let Some(bytes) = self.cached_for_compute::<T>(key).await {
                    return Ok(bytes);
                }
                debug!(key = %key, "Computing fresh value (stampede protected)");
                let value = compute().await?;
                let bytes = Bytes::from(self.codec.serialize(&value)?);
                if let Err(e) = self.set(key, bytes.clone(), options).await {
                    warn!(key = %key, error = %e, "Failed to cache computed value");
                }
                Ok(bytes)
            })
            .await;

        if was_shared {
            debug!(key = %key, "Computed value shared from in-flight call");
        }
        self.codec.deserialize(&result?)
    }

    /// Cached bytes that decode as `T`, checked by the compute leader
    async fn cached_for_compute<T: DeserializeOwned>(&self, key: &str) -> Option<Bytes> {
        let bytes = match self.l1.get(key).await {
            Some(bytes) => bytes,
            None if self.skip_reads_when_unhealthy && !self.l2.is_healthy() => return None,
            None => self
                .breakers
                .get
                .execute(|| self.l2.get_with_ttl(key))
                .await
                .ok()
                .flatten()
                .map(|(raw, _)| Bytes::from(raw))?,
        };
        self.codec.deserialize::<T>(&bytes).is_ok().then_some(bytes)
    }

    /// Force all breakers back to `Closed`
    pub fn reset_circuit_breakers(&self) {
        self.breakers.reset_all();
    }

    /// Drop every L1 entry
    pub fn clear_l1(&self) {
        self.l1.clear();
    }

    #[must_use]
    pub fn breakers(&self) -> &BreakerSet {
        &self.breakers
    }

    #[must_use]
    pub fn l1(&self) -> &Arc<L1Cache> {
        &self.l1
    }

    #[must_use]
    pub fn l2(&self) -> &Arc<L2Cache> {
        &self.l2
    }

    /// Request counters
    #[must_use]
    pub fn stats(&self) -> CacheManagerStats {
        CacheManagerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            l2_skipped: self.l2_skipped.load(Ordering::Relaxed),
            l2_read_errors: self.l2_read_errors.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            in_flight_lookups: self.lookups.in_flight(),
        }
    }

    /// Aggregate health and efficiency snapshot
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        HealthReport::assemble(
            self.stats(),
            self.l1.stats(),
            self.l2.stats(),
            self.l2.health(),
            self.breakers.snapshots(),
            self.lookups.stats(),
            self.l2.config().slow_operation_threshold,
        )
    }
}

/// Cache Manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheManagerStats {
    pub total_requests: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    /// Reads answered as a miss because L2 was flagged unhealthy
    pub l2_skipped: u64,
    /// L2 read failures absorbed into a miss
    pub l2_read_errors: u64,
    pub promotions: u64,
    pub in_flight_lookups: usize,
}

impl CacheManagerStats {
    /// Fraction of requests served by either tier
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        ratio(self.l1_hits + self.l2_hits, self.total_requests)
    }

    #[must_use]
    pub fn l1_hit_rate(&self) -> f64 {
        ratio(self.l1_hits, self.total_requests)
    }
}
