//! Cache Errors
//!
//! Error taxonomy shared by every tier. A cache miss is not an error (it is
//! `Ok(None)`), and neither is an L1 admission rejection (it is `false`).

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the cache tiers.
///
/// `Clone` so that one in-flight L2 result can be handed to every caller
/// collapsed onto it by the [`Deduplicator`](crate::singleflight::Deduplicator).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The remote tier could not be reached or returned a protocol error.
    #[error("{operation}: connection error: {message}")]
    Connection {
        operation: &'static str,
        message: String,
    },

    /// A remote call exceeded its deadline.
    #[error("{operation}: timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// No pooled connection became available within the acquisition timeout.
    #[error("{operation}: connection pool exhausted: {message}")]
    PoolExhausted {
        operation: &'static str,
        message: String,
    },

    /// The breaker guarding `operation` is open; the call was not attempted.
    #[error("{operation}: circuit open, call short-circuited")]
    CircuitOpen { operation: &'static str },

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Build a connection error from anything displayable.
    pub fn connection(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            operation,
            message: err.to_string(),
        }
    }

    /// Whether this error says something about the health of the remote tier.
    ///
    /// Only these errors are retried and counted by circuit breakers.
    #[must_use]
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::PoolExhausted { .. }
        )
    }

    /// Whether the call was rejected by an open breaker without being attempted.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_failure_classification() {
        assert!(CacheError::connection("get", "refused").is_dependency_failure());
        assert!(
            CacheError::Timeout {
                operation: "set",
                after: Duration::from_millis(250)
            }
            .is_dependency_failure()
        );
        assert!(
            CacheError::PoolExhausted {
                operation: "get",
                message: "wait timeout".into()
            }
            .is_dependency_failure()
        );
        assert!(!CacheError::CircuitOpen { operation: "get" }.is_dependency_failure());
        assert!(!CacheError::Serialization("bad".into()).is_dependency_failure());
    }

    #[test]
    fn test_circuit_open_display() {
        let err = CacheError::CircuitOpen { operation: "set" };
        assert!(err.is_circuit_open());
        assert_eq!(err.to_string(), "set: circuit open, call short-circuited");
    }
}
