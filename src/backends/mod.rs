//! Remote Backend Implementations
//!
//! Stores that can sit behind the L2 client.
//!
//! # Available Backends
//!
//! - **Redis** - `deadpool-redis` pooled client (default, feature: `redis`)
//! - **`DashMap`** - In-process store for single-node deployments and tests
//!
//! # Usage
//!
//! ```rust,no_run
//! use tiered_cache::backends::RedisBackend;
//! use tiered_cache::config::L2Config;
//!
//! # async fn example() -> tiered_cache::CacheResult<()> {
//! let redis = RedisBackend::connect(&L2Config::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod dashmap_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use dashmap_cache::{DashMapBackend, glob_match};

#[cfg(feature = "redis")]
pub use redis_cache::RedisBackend;
