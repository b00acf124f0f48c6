//! L2 Health Monitoring
//!
//! [`ConnectionHealth`] is the per-client health record. It is written by two
//! parties only: the latency hook that runs after every L2 call, and the
//! background [`HealthMonitor`] that probes the remote store on a fixed
//! interval and flips the healthy flag after enough consecutive failures.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::l2_cache::L2Cache;

/// Smoothing factor of the rolling latency average
pub const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Health and latency of the connection to the remote tier
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionHealth {
    pub is_healthy: bool,
    /// Consecutive failed liveness probes
    pub consecutive_failures: u32,
    /// Consecutive successful liveness probes
    pub consecutive_successes: u32,
    pub last_latency: Option<Duration>,
    /// Exponential moving average over every recorded call, `alpha = 0.1`
    pub rolling_average_latency: Option<Duration>,
    /// Calls whose latency has been recorded
    pub request_count: u64,
    pub last_checked_at: Option<SystemTime>,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_latency: None,
            rolling_average_latency: None,
            request_count: 0,
            last_checked_at: None,
        }
    }
}

/// Healthy-flag change caused by a probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameUnhealthy,
    Recovered,
}

impl ConnectionHealth {
    /// Fold one call latency into the rolling average
    pub fn record_latency(&mut self, latency: Duration) {
        self.last_latency = Some(latency);
        self.request_count += 1;
        self.rolling_average_latency = Some(match self.rolling_average_latency {
            None => latency,
            Some(average) => average
                .mul_f64(1.0 - LATENCY_EMA_ALPHA)
                .saturating_add(latency.mul_f64(LATENCY_EMA_ALPHA)),
        });
    }

    /// Record a successful liveness probe
    pub fn record_probe_success(&mut self, recovery_threshold: u32) -> Option<HealthTransition> {
        self.last_checked_at = Some(SystemTime::now());
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);

        if !self.is_healthy && self.consecutive_successes >= recovery_threshold {
            self.is_healthy = true;
            return Some(HealthTransition::Recovered);
        }
        None
    }

    /// Record a failed liveness probe
    pub fn record_probe_failure(&mut self, failure_threshold: u32) -> Option<HealthTransition> {
        self.last_checked_at = Some(SystemTime::now());
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.is_healthy && self.consecutive_failures >= failure_threshold {
            self.is_healthy = false;
            return Some(HealthTransition::BecameUnhealthy);
        }
        None
    }
}

/// Periodically probes L2 and maintains its connection pool
///
/// Runs on its own task; caller-path operations never wait on it.
pub struct HealthMonitor {
    l2: Arc<L2Cache>,
    config: HealthConfig,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(l2: Arc<L2Cache>, config: HealthConfig) -> Self {
        Self { l2, config }
    }

    /// Spawn the monitor loop; it exits when `shutdown_rx` fires or its sender is dropped
    #[must_use]
    pub fn start_with_shutdown(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.check_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = %period.as_millis(), "L2 health monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check_once().await;
                        self.l2.maintain_pool().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("L2 health monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Run one probe and update [`ConnectionHealth`]; returns the probe outcome
    pub async fn check_once(&self) -> bool {
        match self.l2.probe(self.config.probe_timeout).await {
            Ok(latency) => {
                debug!(latency_ms = %latency.as_millis(), "L2 health probe succeeded");
                let transition = self
                    .l2
                    .update_health(|h| h.record_probe_success(self.config.recovery_threshold));
                if transition == Some(HealthTransition::Recovered) {
                    info!(backend = self.l2.backend_name(), "L2 connection recovered, marked healthy");
                }
                true
            }
            Err(e) => {
                let transition = self
                    .l2
                    .update_health(|h| h.record_probe_failure(self.config.failure_threshold));
                let failures = self.l2.health().consecutive_failures;
                warn!(error = %e, consecutive_failures = failures, "L2 health probe failed");
                if transition == Some(HealthTransition::BecameUnhealthy) {
                    warn!(
                        backend = self.l2.backend_name(),
                        threshold = self.config.failure_threshold,
                        "L2 connection marked unhealthy"
                    );
                }
                false
            }
        }
    }
}
