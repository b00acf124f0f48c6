//! Cache Configuration
//!
//! Static, per-tier configuration. Everything here is read once at startup
//! (usually from the environment) and never mutated afterwards.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, CacheResult};
use crate::ttl_policy::TtlPolicy;

/// Default Redis URL, same fallback as `REDIS_URL` being unset.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Configuration for the bounded local cache (L1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Config {
    /// Total resident cost budget in bytes
    pub max_cost_bytes: u64,
    /// TTL used when neither an override nor a key category applies
    pub default_ttl: Duration,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_cost_bytes: 64 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
        }
    }
}

/// Configuration for the remote cache client (L2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Config {
    /// Redis connection string
    pub url: String,
    /// TTL used when neither an override nor a key category applies
    pub default_ttl: Duration,
    /// Maximum pooled connections
    pub pool_size: usize,
    /// How long a caller may wait for a pooled connection
    pub pool_timeout: Duration,
    /// Connections unused for longer than this are dropped by pool maintenance
    pub idle_timeout: Duration,
    /// Connections older than this are dropped by pool maintenance
    pub max_lifetime: Duration,
    /// Deadline for a single remote call
    pub operation_timeout: Duration,
    /// Retries after the first attempt, for dependency failures only
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Calls slower than this are logged at `warn`
    pub slow_operation_threshold: Duration,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            default_ttl: Duration::from_secs(1800),
            pool_size: 16,
            pool_timeout: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            operation_timeout: Duration::from_millis(250),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_millis(500),
            slow_operation_threshold: Duration::from_millis(100),
        }
    }
}

/// Thresholds shared by the get/set/delete circuit breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker again
    pub success_threshold: u32,
    /// Time spent open before a trial call is allowed
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the L2 health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub check_interval: Duration,
    /// Deadline of the liveness probe, shorter than regular traffic deadlines
    pub probe_timeout: Duration,
    /// Consecutive probe failures before L2 is flagged unhealthy
    pub failure_threshold: u32,
    /// Consecutive probe successes before an unhealthy L2 is restored
    pub recovery_threshold: u32,
    /// While unhealthy, reads skip L2 and return a miss
    pub skip_reads_when_unhealthy: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
            failure_threshold: 3,
            recovery_threshold: 1,
            skip_reads_when_unhealthy: true,
        }
    }
}

/// Complete configuration of the cache subsystem
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub l1: L1Config,
    pub l2: L2Config,
    pub breaker: BreakerConfig,
    pub health: HealthConfig,
    pub ttl: TtlPolicy,
}

impl CacheConfig {
    /// Read configuration from process environment variables
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Unset variables fall back to defaults; set-but-invalid variables are errors.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if a value cannot be parsed or is out of range.
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = Self::default();

        let l1 = L1Config {
            max_cost_bytes: env.parse("CACHE_L1_MAX_BYTES", defaults.l1.max_cost_bytes)?,
            default_ttl: env.secs("CACHE_L1_DEFAULT_TTL_SECS", defaults.l1.default_ttl)?,
        };

        let l2 = L2Config {
            url: env.get("REDIS_URL").unwrap_or(defaults.l2.url),
            default_ttl: env.secs("CACHE_L2_DEFAULT_TTL_SECS", defaults.l2.default_ttl)?,
            pool_size: env.parse("CACHE_L2_POOL_SIZE", defaults.l2.pool_size)?,
            pool_timeout: env.millis("CACHE_L2_POOL_TIMEOUT_MS", defaults.l2.pool_timeout)?,
            idle_timeout: env.secs("CACHE_L2_IDLE_TIMEOUT_SECS", defaults.l2.idle_timeout)?,
            max_lifetime: env.secs("CACHE_L2_MAX_LIFETIME_SECS", defaults.l2.max_lifetime)?,
            operation_timeout: env.millis("CACHE_L2_OP_TIMEOUT_MS", defaults.l2.operation_timeout)?,
            max_retries: env.parse("CACHE_L2_MAX_RETRIES", defaults.l2.max_retries)?,
            retry_base_delay: env.millis("CACHE_L2_RETRY_BASE_MS", defaults.l2.retry_base_delay)?,
            retry_max_delay: env.millis("CACHE_L2_RETRY_MAX_MS", defaults.l2.retry_max_delay)?,
            slow_operation_threshold: env
                .millis("CACHE_L2_SLOW_OP_MS", defaults.l2.slow_operation_threshold)?,
        };

        let breaker = BreakerConfig {
            failure_threshold: env
                .parse("CACHE_BREAKER_FAILURE_THRESHOLD", defaults.breaker.failure_threshold)?,
            success_threshold: env
                .parse("CACHE_BREAKER_SUCCESS_THRESHOLD", defaults.breaker.success_threshold)?,
            open_timeout: env
                .secs("CACHE_BREAKER_OPEN_TIMEOUT_SECS", defaults.breaker.open_timeout)?,
        };

        let health = HealthConfig {
            check_interval: env.secs("CACHE_HEALTH_INTERVAL_SECS", defaults.health.check_interval)?,
            probe_timeout: env
                .secs("CACHE_HEALTH_PROBE_TIMEOUT_SECS", defaults.health.probe_timeout)?,
            failure_threshold: env
                .parse("CACHE_HEALTH_FAILURE_THRESHOLD", defaults.health.failure_threshold)?,
            recovery_threshold: env
                .parse("CACHE_HEALTH_RECOVERY_THRESHOLD", defaults.health.recovery_threshold)?,
            skip_reads_when_unhealthy: defaults.health.skip_reads_when_unhealthy,
        };

        let config = Self {
            l1,
            l2,
            breaker,
            health,
            ttl: defaults.ttl,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make a component inert or spin.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] naming the offending field.
    pub fn validate(&self) -> CacheResult<()> {
        let checks: [(bool, &str); 8] = [
            (self.l1.max_cost_bytes > 0, "l1.max_cost_bytes must be > 0"),
            (self.l2.pool_size > 0, "l2.pool_size must be > 0"),
            (!self.l2.operation_timeout.is_zero(), "l2.operation_timeout must be > 0"),
            (!self.health.check_interval.is_zero(), "health.check_interval must be > 0"),
            (self.health.failure_threshold > 0, "health.failure_threshold must be > 0"),
            (self.health.recovery_threshold > 0, "health.recovery_threshold must be > 0"),
            (self.breaker.failure_threshold > 0, "breaker.failure_threshold must be > 0"),
            (self.breaker.success_threshold > 0, "breaker.success_threshold must be > 0"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(CacheError::Config((*message).to_string())),
            None => Ok(()),
        }
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str, default: T) -> CacheResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| CacheError::Config(format!("{name}={raw:?}: {e}"))),
            None => Ok(default),
        }
    }

    fn secs(&self, name: &str, default: Duration) -> CacheResult<Duration> {
        self.parse(name, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, name: &str, default: Duration) -> CacheResult<Duration> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(name, default_ms).map(Duration::from_millis)
    }
}
