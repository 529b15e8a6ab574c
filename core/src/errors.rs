//! Error types for circuit breaker operations

use std::error::Error;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call)
///
/// `Open` and `HalfOpenLimitReached` are rejections: the wrapped call was never
/// attempted. `Execution` carries the wrapped call's own error unchanged.
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected
    #[error("circuit '{circuit}' is open (opened at {opened_at:.3}s)")]
    Open { circuit: String, opened_at: f64 },
    /// A half-open probe is already in flight
    #[error("circuit '{circuit}' is half-open and a probe is already in flight")]
    HalfOpenLimitReached { circuit: String },
    /// The wrapped call ran and failed
    #[error("{0}")]
    Execution(E),
}

impl<E> CircuitError<E> {
    /// `true` when the call was rejected without being attempted
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitError::Execution(_))
    }

    /// Borrow the wrapped call's error, if the call was attempted
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }

    /// Take the wrapped call's error, if the call was attempted
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}
