//! Redis Backend - Distributed Cache Store
//!
//! Redis-based L2 store behind a bounded `deadpool-redis` connection pool.
//! The pool is the one shared, mutable resource of the cache: its size and
//! acquisition timeout are the backpressure control.

use deadpool_redis::{Config, Pool, PoolError, Runtime, Timeouts};
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::L2Config;
use crate::error::{CacheError, CacheResult};
use crate::traits::RemoteBackend;

/// Keys fetched per `SCAN` iteration
const SCAN_BATCH: usize = 100;

/// Redis store using a `deadpool-redis` pool
///
/// - Pool size and wait/create/recycle timeouts come from [`L2Config`]
/// - Idle and over-aged connections are evicted by [`RemoteBackend::maintain_pool`]
/// - Pattern scans use cursor-based `SCAN`, never `KEYS`
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Create a pool for `config.url` and verify connectivity with `PING`
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be built or the first `PING` fails.
    pub async fn connect(config: &L2Config) -> CacheResult<Self> {
        info!(redis_url = %config.url, pool_size = config.pool_size, "Initializing Redis backend");

        let backend = Self::with_pool(Self::build_pool(config)?);
        backend.ping().await?;

        info!(redis_url = %config.url, "Redis backend connected successfully");
        Ok(backend)
    }

    /// Build the pool without connecting; connections are created lazily
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the URL or pool settings are rejected.
    pub fn build_pool(config: &L2Config) -> CacheResult<Pool> {
        let mut redis_config = Config::from_url(config.url.as_str());
        let pool_config = redis_config.get_pool_config();
        redis_config.pool = Some(deadpool_redis::PoolConfig {
            max_size: config.pool_size,
            timeouts: Timeouts {
                wait: Some(config.pool_timeout),
                create: Some(config.operation_timeout),
                recycle: Some(config.operation_timeout),
            },
            ..pool_config
        });

        redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Config(format!("failed to create Redis pool: {e}")))
    }

    /// Wrap an existing pool
    #[must_use]
    pub fn with_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Current pool status (size, available, waiting)
    #[must_use]
    pub fn pool_status(&self) -> deadpool_redis::Status {
        self.pool.status()
    }

    async fn connection(&self, operation: &'static str) -> CacheResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| classify_pool_error(operation, &e))
    }
}

fn classify_pool_error(operation: &'static str, err: &PoolError) -> CacheError {
    match err {
        PoolError::Timeout(_) | PoolError::Closed => CacheError::PoolExhausted {
            operation,
            message: err.to_string(),
        },
        _ => CacheError::connection(operation, err),
    }
}

fn classify_redis_error(operation: &'static str, err: &RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout {
            operation,
            after: Duration::ZERO,
        }
    } else {
        CacheError::connection(operation, err)
    }
}

#[async_trait::async_trait]
impl RemoteBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection("get").await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| classify_redis_error("get", &e))
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        let mut conn = self.connection("get").await?;
        // GET and PTTL in one MULTI so the TTL belongs to the value read
        let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .atomic()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| classify_redis_error("get", &e))?;

        // PTTL: -1 = no expiry, -2 = key vanished
        Ok(value.map(|value| {
            let remaining = u64::try_from(pttl).ok().map(Duration::from_millis);
            (value, remaining)
        }))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection("set").await?;
        // PSETEX rejects 0; a sub-millisecond TTL is rounded up.
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = conn
            .pset_ex(key, value, ttl_ms)
            .await
            .map_err(|e| classify_redis_error("set", &e))?;
        debug!(key = %key, ttl_ms = ttl_ms, "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection("delete").await?;
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| classify_redis_error("delete", &e))?;
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection("delete").await?;
        let count: usize = conn
            .del(keys)
            .await
            .map_err(|e| classify_redis_error("delete", &e))?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.connection("scan").await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| classify_redis_error("scan", &e))?;

            cursor = next;
            keys.extend(batch);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once across iterations
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection("ping").await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| classify_redis_error("ping", &e))?;
        Ok(())
    }

    async fn maintain_pool(&self, idle_timeout: Duration, max_lifetime: Duration) -> usize {
        let result = self.pool.retain(|_, metrics| {
            metrics.age() < max_lifetime && metrics.last_used() < idle_timeout
        });
        let removed = result.removed.len();
        if removed > 0 {
            debug!(removed = removed, "[Redis] Evicted idle or expired pooled connections");
        }
        removed
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
