//! Cache System Builder
//!
//! Wires configuration, the remote backend, both tiers, the manager and the
//! background health monitor into a [`CacheSystem`].
//!
//! # Example: Default Redis Backend
//!
//! ```rust,no_run
//! use tiered_cache::CacheSystemBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads CacheConfig from the environment and connects to REDIS_URL
//!     let cache = CacheSystemBuilder::new().build().await?;
//!     cache.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: In-Process Backend
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiered_cache::{CacheConfig, CacheSystemBuilder, DashMapBackend};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cache = CacheSystemBuilder::new()
//!     .with_config(CacheConfig::default())
//!     .with_remote_backend(Arc::new(DashMapBackend::new()))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::CacheConfig;
use crate::health::HealthMonitor;
use crate::traits::RemoteBackend;
use crate::{CacheManager, CacheSystem, L1Cache, L2Cache};

/// Builder for constructing a [`CacheSystem`]
///
/// # Default Behavior
///
/// - configuration: [`CacheConfig::from_env`]
/// - remote backend: [`RedisBackend`](crate::RedisBackend) at `REDIS_URL`
///   (requires the `redis` feature)
/// - health monitor: started
pub struct CacheSystemBuilder {
    config: Option<CacheConfig>,
    remote_backend: Option<Arc<dyn RemoteBackend>>,
    health_monitor: bool,
}

impl CacheSystemBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            remote_backend: None,
            health_monitor: true,
        }
    }

    /// Use an explicit configuration instead of reading the environment
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom remote store as L2
    #[must_use]
    pub fn with_remote_backend(mut self, backend: Arc<dyn RemoteBackend>) -> Self {
        self.remote_backend = Some(backend);
        self
    }

    /// Do not start the background health monitor
    ///
    /// L2 then stays flagged healthy for the life of the system.
    #[must_use]
    pub fn without_health_monitor(mut self) -> Self {
        self.health_monitor = false;
        self
    }

    /// Build the system, failing fast on bad configuration or an unreachable L2
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the default remote
    /// backend cannot be connected.
    pub async fn build(self) -> Result<CacheSystem> {
        info!("Building tiered cache system");

        let config = match self.config {
            Some(config) => config,
            None => CacheConfig::from_env().context("failed to read cache configuration")?,
        };
        config.validate().context("invalid cache configuration")?;

        let backend = match self.remote_backend {
            Some(backend) => backend,
            None => default_backend(&config).await?,
        };
        info!(backend = backend.name(), "Using L2 backend");

        let l1 = Arc::new(L1Cache::new(&config.l1));
        let l2 = Arc::new(L2Cache::new(backend, config.l2.clone()));
        let cache_manager = Arc::new(CacheManager::new(l1, l2.clone(), &config));

        let (shutdown_tx, _) = broadcast::channel(1);
        let monitor = self.health_monitor.then(|| {
            HealthMonitor::new(l2, config.health).start_with_shutdown(shutdown_tx.subscribe())
        });

        info!(health_monitor = monitor.is_some(), "Tiered cache system built successfully");

        Ok(CacheSystem {
            cache_manager,
            monitor,
            shutdown_tx,
        })
    }
}

#[cfg(feature = "redis")]
async fn default_backend(config: &CacheConfig) -> Result<Arc<dyn RemoteBackend>> {
    let backend = crate::RedisBackend::connect(&config.l2)
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.l2.url))?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn default_backend(_config: &CacheConfig) -> Result<Arc<dyn RemoteBackend>> {
    anyhow::bail!("no remote backend configured and the `redis` feature is disabled")
}

impl Default for CacheSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}
