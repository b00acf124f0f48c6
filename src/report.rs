//! Health and efficiency reporting
//!
//! A [`HealthReport`] is a read-only snapshot recomputed on demand from the
//! tier counters, the L2 connection health and the breaker states. The
//! efficiency band and the recommendations are pure functions of those
//! numbers.

use std::fmt;
use std::time::Duration;

use crate::cache_manager::CacheManagerStats;
use crate::circuit_breaker::{CircuitBreakerSnapshot, CircuitState};
use crate::health::ConnectionHealth;
use crate::l1_cache::L1Stats;
use crate::l2_cache::L2Stats;
use crate::singleflight::DedupStats;

/// Lookups needed before hit-rate based advice is given
const MIN_SAMPLE: u64 = 100;

/// Qualitative cache efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EfficiencyBand {
    Poor,
    Moderate,
    Good,
    Excellent,
}

impl EfficiencyBand {
    /// Band for an overall hit rate and average remote latency
    ///
    /// | band      | hit rate | L2 latency |
    /// |-----------|----------|------------|
    /// | excellent | >= 90%   | < 5ms      |
    /// | good      | >= 75%   | < 20ms     |
    /// | moderate  | >= 50%   | any        |
    /// | poor      | < 50%    | any        |
    #[must_use]
    pub fn assess(hit_rate: f64, average_latency: Option<Duration>) -> Self {
        let latency = average_latency.unwrap_or(Duration::ZERO);
        if hit_rate >= 0.9 && latency < Duration::from_millis(5) {
            Self::Excellent
        } else if hit_rate >= 0.75 && latency < Duration::from_millis(20) {
            Self::Good
        } else if hit_rate >= 0.5 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for EfficiencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator advice derived from the report metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Remote tier failed its liveness probes
    L2Unhealthy,
    /// A breaker is not closed
    CircuitNotClosed {
        operation: &'static str,
        state: CircuitState,
    },
    /// L1 is full and missing often, or rejecting many writes
    IncreaseL1Budget,
    /// Most lookups reach the origin
    ConsiderCacheWarming,
    /// Average remote latency above the slow-operation ceiling
    InvestigateL2Latency { average: Duration },
    /// Many callers were collapsed onto in-flight lookups
    HotKeys,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2Unhealthy => {
                f.write_str("L2 is unhealthy: reads bypass it until probes succeed, check connectivity")
            }
            Self::CircuitNotClosed { operation, state } => write!(
                f,
                "circuit breaker for L2 {operation} is {state:?}: L2 {operation} calls are failing fast"
            ),
            Self::IncreaseL1Budget => {
                f.write_str("increase L1 budget: L1 is near capacity and missing or rejecting entries")
            }
            Self::ConsiderCacheWarming => {
                f.write_str("consider cache warming: most lookups miss both tiers")
            }
            Self::InvestigateL2Latency { average } => write!(
                f,
                "investigate L2 latency: rolling average is {}ms",
                average.as_millis()
            ),
            Self::HotKeys => f.write_str(
                "hot keys detected: many concurrent misses share one key, consider longer L1 TTLs for them",
            ),
        }
    }
}

/// Aggregate health/efficiency snapshot
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub manager: CacheManagerStats,
    pub l1: L1Stats,
    pub l2: L2Stats,
    pub connection: ConnectionHealth,
    pub breakers: [CircuitBreakerSnapshot; 3],
    pub dedup: DedupStats,
    pub band: EfficiencyBand,
    pub recommendations: Vec<Recommendation>,
}

impl HealthReport {
    /// Assemble a report from component snapshots
    #[must_use]
    pub fn assemble(
        manager: CacheManagerStats,
        l1: L1Stats,
        l2: L2Stats,
        connection: ConnectionHealth,
        breakers: [CircuitBreakerSnapshot; 3],
        dedup: DedupStats,
        slow_operation_threshold: Duration,
    ) -> Self {
        let band = EfficiencyBand::assess(manager.hit_rate(), connection.rolling_average_latency);
        let mut report = Self {
            manager,
            l1,
            l2,
            connection,
            breakers,
            dedup,
            band,
            recommendations: Vec::new(),
        };
        report.recommendations = report.recommend(slow_operation_threshold);
        report
    }

    fn recommend(&self, slow_operation_threshold: Duration) -> Vec<Recommendation> {
        let mut advice = Vec::new();

        if !self.connection.is_healthy {
            advice.push(Recommendation::L2Unhealthy);
        }

        for breaker in &self.breakers {
            if breaker.state != CircuitState::Closed {
                advice.push(Recommendation::CircuitNotClosed {
                    operation: breaker.operation,
                    state: breaker.state,
                });
            }
        }

        let l1_lookups = self.l1.hits + self.l1.misses;
        let l1_pressure = self.l1.utilization() >= 0.9 && self.l1.hit_rate() < 0.5;
        let l1_rejecting = self.l1.rejections * 10 > self.l1.sets + self.l1.rejections;
        if l1_lookups >= MIN_SAMPLE && (l1_pressure || l1_rejecting) {
            advice.push(Recommendation::IncreaseL1Budget);
        }

        if self.manager.total_requests >= MIN_SAMPLE && self.manager.hit_rate() < 0.5 {
            advice.push(Recommendation::ConsiderCacheWarming);
        }

        match self.connection.rolling_average_latency {
            Some(average) if average > slow_operation_threshold => {
                advice.push(Recommendation::InvestigateL2Latency { average });
            }
            _ => {}
        }

        if self.dedup.executed + self.dedup.shared >= MIN_SAMPLE
            && self.dedup.collapse_ratio() >= 0.2
        {
            advice.push(Recommendation::HotKeys);
        }

        advice
    }

    /// Human-readable one-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "efficiency={} hit_rate={:.1}% l1_hit_rate={:.1}% l2_healthy={} collapsed={}",
            self.band,
            self.manager.hit_rate() * 100.0,
            self.manager.l1_hit_rate() * 100.0,
            self.connection.is_healthy,
            self.dedup.shared,
        )
    }
}
