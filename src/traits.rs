//! Cache Backend Traits
//!
//! Trait abstractions at the tier boundary:
//!
//! - `CacheCodec`: pluggable serialization for the typed adapter
//! - `RemoteBackend`: the networked store behind the L2 client
//!
//! Tiers only ever exchange bytes. Typed values are (de)serialized by the
//! [`CacheManager`](crate::CacheManager) adapter methods through a codec.
//!
//! # Example: Custom Remote Backend
//!
//! ```rust,ignore
//! use tiered_cache::{RemoteBackend, CacheResult, async_trait};
//! use std::time::Duration;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl RemoteBackend for MyStore {
//!     async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> { todo!() }
//!     async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> { todo!() }
//!     async fn remove(&self, key: &str) -> CacheResult<()> { todo!() }
//!     async fn remove_many(&self, keys: &[String]) -> CacheResult<usize> { todo!() }
//!     async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> { todo!() }
//!     async fn ping(&self) -> CacheResult<()> { todo!() }
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::CacheResult;

/// Trait for cache value serialization/deserialization
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access across async tasks.
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`](crate::CacheError::Serialization) if encoding fails.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`](crate::CacheError::Serialization) if decoding fails.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<T>;

    /// Name of the codec, for logging
    fn name(&self) -> &'static str;
}

/// Networked key/value store used as the L2 tier
///
/// Implementations own their connection handling (pooling, reconnection).
/// Deadlines, retries and latency accounting are layered on top by
/// [`L2Cache`](crate::L2Cache), so implementations should issue exactly one
/// round trip per call.
///
/// # Error Semantics
///
/// - A missing key is `Ok(None)`, never an error.
/// - Transport problems must be reported as
///   [`CacheError::Connection`](crate::CacheError::Connection) or
///   [`CacheError::PoolExhausted`](crate::CacheError::PoolExhausted) so that
///   circuit breakers and the health monitor can see them.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Get raw bytes by key
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Get raw bytes together with the entry's remaining time-to-live
    ///
    /// `Some((value, None))` means the entry has no expiry, or the backend
    /// cannot report it. Used for promotion so an L1 copy never outlives
    /// the L2 entry it came from.
    async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        Ok(self.get(key).await?.map(|value| (value, None)))
    }

    /// Store raw bytes with a time-to-live
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Remove a key (removing an absent key is not an error)
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Remove several keys at once, returning how many existed
    async fn remove_many(&self, keys: &[String]) -> CacheResult<usize>;

    /// List keys matching a glob-style pattern (`*`, `?`, `[...]`)
    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Lightweight liveness probe
    async fn ping(&self) -> CacheResult<()>;

    /// Evict idle or over-aged pooled connections
    ///
    /// Called from the health monitor on every tick. Backends without a pool
    /// have nothing to do.
    async fn maintain_pool(&self, _idle_timeout: Duration, _max_lifetime: Duration) -> usize {
        0
    }

    /// Name of this backend, for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}
