//! Trip and untrip policies
//!
//! A policy looks at the [`Counters`] accumulated since the last transition and
//! returns a single decision. The breaker asks its trip policy after every
//! outcome while Closed, and its untrip policy after every successful probe
//! while HalfOpen.
//!
//! Policies run while the breaker's lock is held. They must be pure and must
//! not call back into the breaker.

use crate::Counters;

/// Strategy deciding a state transition from a counters snapshot
///
/// # Examples
///
/// ```rust
/// use spark_breaker::{CounterPolicy, Counters};
///
/// #[derive(Debug)]
/// struct AnyTimeout;
///
/// impl CounterPolicy for AnyTimeout {
///     fn check(&self, counters: &Counters) -> bool {
///         counters.timeout > 0
///     }
/// }
/// ```
pub trait CounterPolicy: Send + Sync + std::fmt::Debug {
    /// Return `true` when the transition guarded by this policy should happen
    fn check(&self, counters: &Counters) -> bool;
}

/// Trip when the failure ratio reaches a threshold
///
/// The ratio is only evaluated once at least `minimum_calls` outcomes have
/// been recorded. The default trips at 50% after a single outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRate {
    threshold: f64,
    minimum_calls: u64,
}

impl FailureRate {
    /// Create a rate policy; `threshold` is clamped to `0.0..=1.0`
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            minimum_calls: 1,
        }
    }

    /// Require at least `calls` outcomes before the ratio is considered
    pub fn minimum_calls(mut self, calls: u64) -> Self {
        self.minimum_calls = calls.max(1);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for FailureRate {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl CounterPolicy for FailureRate {
    fn check(&self, counters: &Counters) -> bool {
        counters.total() >= self.minimum_calls && counters.failure_ratio() >= self.threshold
    }
}

/// Trip once an absolute number of failures has been recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCount {
    failures: u64,
}

impl FailureCount {
    pub fn new(failures: u64) -> Self {
        Self {
            failures: failures.max(1),
        }
    }
}

impl CounterPolicy for FailureCount {
    fn check(&self, counters: &Counters) -> bool {
        counters.failure >= self.failures
    }
}

/// Untrip once enough probes have succeeded
///
/// The default requires two successful probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessThreshold {
    successes: u64,
}

impl SuccessThreshold {
    pub fn new(successes: u64) -> Self {
        Self {
            successes: successes.max(1),
        }
    }
}

impl Default for SuccessThreshold {
    fn default() -> Self {
        Self::new(2)
    }
}

impl CounterPolicy for SuccessThreshold {
    fn check(&self, counters: &Counters) -> bool {
        counters.success >= self.successes
    }
}

/// Closure-backed policy
///
/// ```rust
/// use spark_breaker::{CounterPolicy, Counters, PredicatePolicy};
///
/// let policy = PredicatePolicy::new(|c: &Counters| c.failure >= 3 && c.success == 0);
/// assert!(!policy.check(&Counters::default()));
/// ```
pub struct PredicatePolicy<F>
where
    F: Fn(&Counters) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicatePolicy<F>
where
    F: Fn(&Counters) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> CounterPolicy for PredicatePolicy<F>
where
    F: Fn(&Counters) -> bool + Send + Sync,
{
    fn check(&self, counters: &Counters) -> bool {
        (self.predicate)(counters)
    }
}

impl<F> std::fmt::Debug for PredicatePolicy<F>
where
    F: Fn(&Counters) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicatePolicy")
            .field("predicate", &"<closure>")
            .finish()
    }
}
