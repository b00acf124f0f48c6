//! Tiered Cache
//!
//! A two-tier caching library for services sitting in front of a slower data store:
//! - **L1 Cache**: bounded in-process Moka cache with cost-based admission and per-key TTL
//! - **L2 Cache**: remote store (Redis by default) behind timeouts, retries and a health monitor
//! - **Stampede Protection**: concurrent misses for one key share a single L2 round trip
//! - **Circuit Breakers**: one per L2 operation kind (get/set/delete)
//! - **Adaptive TTLs**: key-pattern heuristics pick per-tier TTL bands
//! - **Automatic L2-to-L1 Promotion**
//! - **Health Reporting**: hit rates, latency, efficiency band and recommendations
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tiered_cache::{CacheConfig, CacheSystem, TtlOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystem::new(CacheConfig::from_env()?).await?;
//!     let manager = cache.cache_manager();
//!
//!     manager.set("article:42", b"hello".to_vec(), TtlOptions::heuristic()).await?;
//!
//!     // L1 first, then L2 with promotion; L2 failures degrade to a miss
//!     if let Some(bytes) = manager.get("article:42").await {
//!         tracing::info!(len = bytes.len(), "cache hit");
//!     }
//!
//!     tracing::info!("{}", manager.health_report().summary());
//!     cache.shutdown().await
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Request → L1 (Moka) → Deduplicator → Breaker → L2 (Redis) → caller's origin
//!           ↓ hit         ↓ shared      ↓ open     ↓ hit
//!           return        same result   miss       promote to L1
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

pub mod backends;
pub mod builder;
pub mod cache_manager;
pub mod circuit_breaker;
pub mod codecs;
pub mod config;
pub mod error;
pub mod health;
pub mod l1_cache;
pub mod l2_cache;
pub mod report;
pub mod singleflight;
pub mod traits;
pub mod ttl_policy;

pub use backends::DashMapBackend;
#[cfg(feature = "redis")]
pub use backends::RedisBackend;
pub use builder::CacheSystemBuilder;
pub use cache_manager::{CacheManager, CacheManagerStats};
pub use circuit_breaker::{BreakerSet, CircuitBreaker, CircuitBreakerSnapshot, CircuitState};
pub use codecs::JsonCodec;
pub use config::{BreakerConfig, CacheConfig, HealthConfig, L1Config, L2Config};
pub use error::{CacheError, CacheResult};
pub use health::{ConnectionHealth, HealthMonitor};
pub use l1_cache::{L1Cache, L1Stats};
pub use l2_cache::{L2Cache, L2Stats};
pub use report::{EfficiencyBand, HealthReport, Recommendation};
pub use singleflight::{DedupStats, Deduplicator};
pub use traits::{CacheCodec, RemoteBackend};
pub use ttl_policy::{
    KeyCategory, PatternScope, TtlBand, TtlOptions, TtlPolicy, classify_key, classify_pattern,
};

// Re-export async_trait for custom backend implementations
pub use async_trait::async_trait;

/// Main entry point for the tiered cache
///
/// Owns the [`CacheManager`] and the background health monitor. Construct it
/// once at startup and pass [`CacheSystem::cache_manager`] to collaborators.
///
/// Call [`CacheSystem::shutdown`] to stop the monitor; dropping the system
/// also stops it, without waiting.
pub struct CacheSystem {
    cache_manager: Arc<CacheManager>,
    monitor: Option<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CacheSystem {
    /// Build a system with the default remote backend
    ///
    /// # Errors
    ///
    /// Fails fast if the configuration is invalid or L2 is unreachable.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tiered_cache::{CacheConfig, CacheSystem};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = CacheConfig {
    ///         l2: tiered_cache::L2Config {
    ///             url: "redis://localhost:6379".to_string(),
    ///             ..Default::default()
    ///         },
    ///         ..Default::default()
    ///     };
    ///     let cache = CacheSystem::new(config).await?;
    ///     cache.shutdown().await
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> Result<Self> {
        CacheSystemBuilder::new().with_config(config).build().await
    }

    /// Get reference to cache manager (primary interface)
    #[must_use]
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache_manager
    }

    /// Whether the background health monitor is running
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop background tasks and wait for them to exit
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor task panicked.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down tiered cache system");
        // No receivers just means the monitor was never started.
        self.shutdown_tx.send(()).ok();

        if let Some(handle) = self.monitor {
            handle.await.context("health monitor task failed")?;
        }
        info!("Tiered cache system stopped");
        Ok(())
    }
}
