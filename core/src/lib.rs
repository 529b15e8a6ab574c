//! spark-breaker - circuit breaker proxy for remote calls
//!
//! A [`CircuitBreaker`] wraps a fallible call and tracks its outcomes:
//! - Closed: calls pass through, outcomes are counted
//! - Open: calls are rejected without being attempted until the cooldown elapses
//! - HalfOpen: a single probe at a time tests whether the remote has recovered
//!
//! Trip and untrip decisions are delegated to [`CounterPolicy`] strategies that
//! look at the [`Counters`] accumulated since the last transition.
//!
//! # Example
//!
//! ```rust
//! use spark_breaker::{CircuitBreaker, State};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("inventory")
//!     .cooldown(Duration::from_secs(5))
//!     .on_open(|t| println!("circuit {} opened", t.circuit))
//!     .build();
//!
//! for _ in 0..2 {
//!     let result = circuit.call(|| Ok::<_, String>("in stock"));
//!     assert_eq!(result.unwrap(), "in stock");
//! }
//!
//! // 1 failure out of 3 calls stays below the default 50% failure rate
//! let _ = circuit.call(|| Err::<(), _>("connection refused".to_string()));
//! assert_eq!(circuit.state(), State::Closed);
//!
//! // 2 out of 4 reaches it
//! let _ = circuit.call(|| Err::<(), _>("connection refused".to_string()));
//! assert_eq!(circuit.state(), State::Open);
//!
//! match circuit.call(|| Ok::<_, String>("never runs")) {
//!     Err(e) if e.is_rejection() => println!("rejected: {}", e),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod clock;
pub mod errors;
pub mod policy;

pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, Transition};
pub use circuit::{CircuitBreaker, Config, DEFAULT_NAME};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::CircuitError;
pub use policy::{CounterPolicy, FailureCount, FailureRate, PredicatePolicy, SuccessThreshold};

use std::fmt;

/// Outcome of a call that was actually attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Outcome counters accumulated since the last state transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub success: u64,
    pub failure: u64,
    /// Reserved for custom policies; never incremented by the breaker
    pub timeout: u64,
    /// Reserved for custom policies; rejections do not mutate counters
    pub rejection: u64,
}

impl Counters {
    /// Number of attempted calls (successes plus failures)
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    /// Failure ratio over attempted calls, `0.0` when nothing was recorded
    pub fn failure_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.failure as f64 / total as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    /// Map a state machine state name onto [`State`]
    pub(crate) fn from_machine(name: &str) -> Self {
        match name {
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            _ => State::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_ratio() {
        let counters = Counters {
            success: 2,
            failure: 2,
            ..Default::default()
        };
        assert_eq!(counters.total(), 4);
        assert_eq!(counters.failure_ratio(), 0.5);
        assert_eq!(Counters::default().failure_ratio(), 0.0);
    }

    #[test]
    fn test_counters_record_and_clear() {
        let mut counters = Counters::default();
        counters.record(Outcome::Success);
        counters.record(Outcome::Failure);
        counters.record(Outcome::Failure);
        assert_eq!(counters.success, 1);
        assert_eq!(counters.failure, 2);
        assert_eq!(counters.timeout, 0);
        assert_eq!(counters.rejection, 0);

        counters.clear();
        assert!(counters.is_empty());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(State::Closed.to_string(), "closed");
        assert_eq!(State::Open.to_string(), "open");
        assert_eq!(State::HalfOpen.to_string(), "half-open");

        assert_eq!(State::from_machine("Closed"), State::Closed);
        assert_eq!(State::from_machine("Open"), State::Open);
        assert_eq!(State::from_machine("HalfOpen"), State::HalfOpen);
    }
}
