//! Builder API for ergonomic circuit breaker configuration

use crate::{
    Counters,
    callbacks::{Callbacks, Transition},
    circuit::{CircuitBreaker, CircuitContext, Config},
    clock::{Clock, MonotonicClock},
    policy::{CounterPolicy, PredicatePolicy},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the policy that trips a Closed circuit
    pub fn trip_policy(mut self, policy: Arc<dyn CounterPolicy>) -> Self {
        self.config.trip = policy;
        self
    }

    /// Set the policy that closes a HalfOpen circuit
    pub fn untrip_policy(mut self, policy: Arc<dyn CounterPolicy>) -> Self {
        self.config.untrip = policy;
        self
    }

    /// Trip when the closure returns `true`
    ///
    /// ```rust
    /// use spark_breaker::{CircuitBreaker, Counters};
    ///
    /// let circuit = CircuitBreaker::builder("search")
    ///     .trip_when(|c: &Counters| c.failure >= 5)
    ///     .untrip_when(|c: &Counters| c.success >= 3)
    ///     .build();
    /// assert!(circuit.is_closed());
    /// ```
    pub fn trip_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&Counters) -> bool + Send + Sync + 'static,
    {
        self.trip_policy(Arc::new(PredicatePolicy::new(predicate)))
    }

    /// Close a HalfOpen circuit when the closure returns `true`
    pub fn untrip_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&Counters) -> bool + Send + Sync + 'static,
    {
        self.untrip_policy(Arc::new(PredicatePolicy::new(predicate)))
    }

    /// Set how long the circuit stays Open before probing
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Set the cooldown in whole seconds
    pub fn cooldown_secs(self, seconds: u64) -> Self {
        self.cooldown(Duration::from_secs(seconds))
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: cooldown * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set the time source used for cooldown tracking
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let context = CircuitContext {
            name: self.name,
            config: self.config,
            clock,
        };

        CircuitBreaker::with_context_and_callbacks(context, self.callbacks)
    }
}
