use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;
use crate::error::{CacheError, CacheResult};

/// Circuit breaker state machine.
///
/// - `Closed` -> `Open`: after `failure_threshold` consecutive failures
/// - `Open` -> `HalfOpen`: once `open_timeout` has elapsed, for a single trial call
/// - `HalfOpen` -> `Closed`: after `success_threshold` consecutive trial successes
/// - `HalfOpen` -> `Open`: on any trial failure, restarting the open timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls are attempted.
    Closed,
    /// Calls are short-circuited with [`CacheError::CircuitOpen`].
    Open,
    /// Recovery mode, one trial call at a time.
    HalfOpen,
}

/// Mutable state, all under one lock so transitions are atomic.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    /// A half-open trial call is currently running
    trial_in_flight: bool,
}

impl BreakerInner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Read-only view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub operation: &'static str,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Time since the last recorded failure
    pub since_last_failure: Option<Duration>,
}

/// Failure-isolation wrapper around one kind of remote operation.
///
/// One instance guards one operation kind (get, set or delete), never a
/// single key: failures on unrelated keys add up. Only dependency failures
/// (see [`CacheError::is_dependency_failure`]) count; a serialization error
/// says nothing about the remote tier.
pub struct CircuitBreaker {
    operation: &'static str,
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(operation: &'static str, config: BreakerConfig) -> Self {
        Self {
            operation,
            inner: Mutex::new(BreakerInner::closed()),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_timeout: config.open_timeout,
        }
    }

    /// Run `op` unless the circuit is open.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CircuitOpen`] without invoking `op` while open (or
    /// while another half-open trial is running); otherwise returns `op`'s error.
    pub async fn execute<T, F, Fut>(&self, op: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let permit = self.acquire()?;
        let result = op().await;
        match &result {
            Ok(_) => permit.success(),
            Err(e) if e.is_dependency_failure() => permit.failure(),
            Err(_) => permit.neutral(),
        }
        result
    }

    fn acquire(&self) -> CacheResult<Permit<'_>> {
        let mut inner = self.inner.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map_or(Duration::MAX, |t| t.elapsed());
                if elapsed < self.open_timeout {
                    return Err(self.open_error());
                }
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                tracing::warn!(operation = self.operation, "circuit breaker transitioning to half-open state");
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.open_error());
                }
                true
            }
        };
        if trial {
            inner.trial_in_flight = true;
        }
        Ok(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        // Calls admitted while closed may finish after the breaker opened;
        // only trial calls move a half-open breaker.
        if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        } else if trial && inner.state == CircuitState::HalfOpen {
            inner.consecutive_failures = 0;
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.success_threshold {
                *inner = BreakerInner::closed();
                tracing::info!(operation = self.operation, "circuit breaker closed after successful trials");
            }
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_failure_at = Some(now);
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;
        if trial {
            inner.trial_in_flight = false;
        }

        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                tracing::warn!(operation = self.operation, "circuit breaker re-opened after failed trial");
            }
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                tracing::warn!(
                    operation = self.operation,
                    threshold = self.failure_threshold,
                    "circuit breaker opened after reaching failure threshold"
                );
            }
            // A call admitted while closed can finish after another one tripped the breaker.
            CircuitState::Closed | CircuitState::Open | CircuitState::HalfOpen => {}
        }
    }

    fn release_trial(&self) {
        self.inner.lock().trial_in_flight = false;
    }

    fn open_error(&self) -> CacheError {
        CacheError::CircuitOpen {
            operation: self.operation,
        }
    }

    /// Force the breaker back to `Closed` (administrative action)
    pub fn reset(&self) {
        *self.inner.lock() = BreakerInner::closed();
        tracing::info!(operation = self.operation, "circuit breaker manually reset");
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            operation: self.operation,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            since_last_failure: inner.last_failure_at.map(|t| t.elapsed()),
        }
    }
}

/// Admission ticket for one call. If the call's future is dropped before it
/// settles, a half-open trial slot is handed back instead of leaking.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    fn neutral(self) {
        // Drop releases the trial slot without counting either way
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}

/// The three breakers of the remote tier, one per operation kind
pub struct BreakerSet {
    pub get: CircuitBreaker,
    pub set: CircuitBreaker,
    pub delete: CircuitBreaker,
}

impl BreakerSet {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            get: CircuitBreaker::new("get", config),
            set: CircuitBreaker::new("set", config),
            delete: CircuitBreaker::new("delete", config),
        }
    }

    pub fn reset_all(&self) {
        self.get.reset();
        self.set.reset();
        self.delete.reset();
    }

    #[must_use]
    pub fn snapshots(&self) -> [CircuitBreakerSnapshot; 3] {
        [
            self.get.snapshot(),
            self.set.snapshot(),
            self.delete.snapshot(),
        ]
    }
}
