//! Circuit breaker implementation using state machines
//!
//! The breaker keeps its state machine behind a single mutex. The lock is taken
//! twice per call (admission, then bookkeeping) and is never held while the
//! wrapped call runs.

use crate::{
    Counters, Outcome, State,
    callbacks::{Callbacks, Transition},
    clock::{Clock, MonotonicClock},
    errors::CircuitError,
    policy::{CounterPolicy, FailureRate, SuccessThreshold},
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Name given to breakers built with [`CircuitBreaker::default`]
pub const DEFAULT_NAME: &str = "Service-B Proxy";

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Decides Closed -> Open after each outcome
    pub trip: Arc<dyn CounterPolicy>,

    /// Decides HalfOpen -> Closed after each successful probe
    pub untrip: Arc<dyn CounterPolicy>,

    /// How long the circuit stays Open before the next call may probe
    pub cooldown: Duration,

    /// Jitter factor for the cooldown (0.0 = none, 1.0 = full)
    /// Uses chrono-machines formula: cooldown * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trip: Arc::new(FailureRate::default()),
            untrip: Arc::new(SuccessThreshold::default()),
            cooldown: Duration::from_secs(1),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Cooldown to apply for one Open period, in seconds
    fn open_period_secs(&self) -> f64 {
        if self.jitter_factor <= 0.0 {
            return self.cooldown.as_secs_f64();
        }

        let base_ms = u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX);
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: base_ms,
            multiplier: 1.0,
            max_delay_ms: base_ms,
        };
        let delay_ms = policy.calculate_delay(1, self.jitter_factor.min(1.0));
        (delay_ms as f64) / 1000.0
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            config: Config::default(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

/// Data specific to the Closed state
#[derive(Debug, Clone, Default)]
pub struct ClosedData {
    pub counters: Counters,
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
    pub cooldown_secs: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub counters: Counters,
    pub probe_in_flight: bool,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed(ClosedData),
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [cooldown_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Ask the trip policy about the outcomes seen while Closed
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        self.state_data_closed()
            .is_some_and(|data| ctx.config.trip.check(&data.counters))
    }
}

impl Circuit<HalfOpen> {
    /// Any failed probe reopens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .is_some_and(|data| data.counters.failure > 0)
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .is_some_and(|data| ctx.config.untrip.check(&data.counters))
    }
}

impl Circuit<Open> {
    fn cooldown_elapsed(&self, ctx: &CircuitContext) -> bool {
        self.state_data_open()
            .is_some_and(|data| ctx.clock.now() >= data.opened_at + data.cooldown_secs)
    }
}

/// Admission handed to a call that is allowed to run
#[derive(Debug, Clone, Copy)]
struct Ticket {
    epoch: u64,
}

/// Why a call was not admitted
#[derive(Debug, Clone, Copy)]
enum Rejection {
    Open { opened_at: f64 },
    ProbeInFlight,
}

/// Lock-guarded breaker state
struct Inner {
    machine: DynamicCircuit,
    entered_at: f64,
    /// Bumped on every transition; outcomes from older epochs are dropped
    epoch: u64,
}

/// Per-state data is seeded at construction and by every transition; report
/// it loudly if it is ever gone
fn require_data<T>(data: Option<T>, ctx: &CircuitContext, state: State) -> Option<T> {
    debug_assert!(data.is_some(), "{} state has no data", state);
    if data.is_none() {
        warn!(circuit = %ctx.name, %state, "state data missing");
    }
    data
}

impl Inner {
    fn new(context: &CircuitContext) -> Self {
        // The machine only fills state data on transitions, not for the initial state
        let mut machine = DynamicCircuit::new(context.clone());
        let seeded = machine.set_closed_data(ClosedData::default());
        debug_assert!(seeded.is_ok(), "a new machine starts Closed");

        Self {
            machine,
            entered_at: context.clock.now(),
            epoch: 0,
        }
    }

    fn state(&self) -> State {
        State::from_machine(self.machine.current_state())
    }

    fn counters(&self) -> Counters {
        let counters = match self.state() {
            State::Closed => self.machine.closed_data().map(|d| d.counters),
            State::HalfOpen => self.machine.half_open_data().map(|d| d.counters),
            State::Open => None,
        };
        counters.unwrap_or_default()
    }

    fn counters_mut(&mut self) -> Option<&mut Counters> {
        match self.state() {
            State::Closed => self.machine.closed_data_mut().map(|d| &mut d.counters),
            State::HalfOpen => self.machine.half_open_data_mut().map(|d| &mut d.counters),
            State::Open => None,
        }
    }

    fn opened_at(&self) -> f64 {
        self.machine
            .open_data()
            .map(|d| d.opened_at)
            .unwrap_or(self.entered_at)
    }

    /// Decide whether a call may run, resolving a due Open -> HalfOpen first
    fn admit(&mut self, ctx: &CircuitContext) -> (Result<Ticket, Rejection>, Option<Transition>) {
        let transition = if self.state() == State::Open {
            self.fire(ctx, CircuitEvent::AttemptReset)
        } else {
            None
        };

        let ticket = Ticket { epoch: self.epoch };
        let admission = match self.state() {
            State::Closed => Ok(ticket),
            State::Open => Err(Rejection::Open {
                opened_at: self.opened_at(),
            }),
            State::HalfOpen => {
                match require_data(self.machine.half_open_data_mut(), ctx, State::HalfOpen) {
                    Some(data) if !data.probe_in_flight => {
                        data.probe_in_flight = true;
                        Ok(ticket)
                    }
                    // Without a probe slot to claim, nothing runs
                    _ => Err(Rejection::ProbeInFlight),
                }
            }
        };

        (admission, transition)
    }

    /// Count an outcome and re-evaluate the state
    fn record(&mut self, ctx: &CircuitContext, ticket: Ticket, outcome: Outcome) -> Option<Transition> {
        if ticket.epoch != self.epoch {
            debug!(
                circuit = %ctx.name,
                ?outcome,
                "discarding outcome of a call admitted before the last transition"
            );
            return None;
        }

        match self.state() {
            State::Closed => {
                if let Some(counters) = require_data(self.counters_mut(), ctx, State::Closed) {
                    counters.record(outcome);
                }
                self.fire(ctx, CircuitEvent::Trip)
            }
            State::HalfOpen => {
                let data = self.machine.half_open_data_mut();
                if let Some(data) = require_data(data, ctx, State::HalfOpen) {
                    data.probe_in_flight = false;
                    data.counters.record(outcome);
                }
                match self.fire(ctx, CircuitEvent::Trip) {
                    Some(transition) => Some(transition),
                    None => self.fire(ctx, CircuitEvent::Close),
                }
            }
            // Admission never hands out tickets while Open
            State::Open => None,
        }
    }

    /// Handle an event; on success stamp the new state and start a new epoch
    fn fire(&mut self, ctx: &CircuitContext, event: CircuitEvent) -> Option<Transition> {
        let from = self.state();
        let counters = self.counters();

        if self.machine.handle(event).is_err() {
            return None;
        }

        let to = self.state();
        let at = ctx.clock.now();
        self.entered_at = at;
        self.epoch += 1;

        // Every state starts counting from zero
        if let Some(counters) = self.counters_mut() {
            counters.clear();
        }
        if let Some(data) = self.machine.half_open_data_mut() {
            data.probe_in_flight = false;
        }

        match to {
            State::Open => {
                let cooldown_secs = ctx.config.open_period_secs();
                if let Some(data) = self.machine.open_data_mut() {
                    data.opened_at = at;
                    data.cooldown_secs = cooldown_secs;
                }
                warn!(
                    circuit = %ctx.name,
                    %from,
                    successes = counters.success,
                    failures = counters.failure,
                    cooldown_secs,
                    "circuit opened"
                );
            }
            State::HalfOpen => {
                debug!(circuit = %ctx.name, "circuit half-open, probing");
            }
            State::Closed => {
                info!(
                    circuit = %ctx.name,
                    successes = counters.success,
                    "circuit closed"
                );
            }
        }

        Some(Transition {
            circuit: ctx.name.clone(),
            from,
            to,
            counters,
            at,
        })
    }
}

/// Circuit breaker public API
///
/// `CircuitBreaker` is `Send + Sync`; share it between callers with an `Arc`.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let context = CircuitContext {
            name: name.into(),
            config,
            clock: Arc::new(MonotonicClock::new()),
        };

        Self::with_context_and_callbacks(context, Callbacks::new())
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(
        context: CircuitContext,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::new(&context)),
            context,
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// Returns the operation's value, its own error wrapped in
    /// [`CircuitError::Execution`], or a rejection when the circuit refused to
    /// run it. A panic inside `work` is counted as a failure and then resumed.
    pub fn call<T, E, F>(&self, work: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let ticket = self.admit()?;

        let result = panic::catch_unwind(AssertUnwindSafe(work));
        let outcome = match &result {
            Ok(Ok(_)) => Outcome::Success,
            Ok(Err(_)) | Err(_) => Outcome::Failure,
        };
        self.complete(ticket, outcome);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CircuitError::Execution(e)),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn admit<E>(&self) -> Result<Ticket, CircuitError<E>> {
        let (admission, transition) = self.inner.lock().admit(&self.context);

        if let Some(transition) = transition {
            self.callbacks.dispatch(&transition);
        }

        admission.map_err(|rejection| {
            trace!(circuit = %self.context.name, ?rejection, "call rejected");
            match rejection {
                Rejection::Open { opened_at } => CircuitError::Open {
                    circuit: self.context.name.clone(),
                    opened_at,
                },
                Rejection::ProbeInFlight => CircuitError::HalfOpenLimitReached {
                    circuit: self.context.name.clone(),
                },
            }
        })
    }

    fn complete(&self, ticket: Ticket, outcome: Outcome) {
        let transition = self.inner.lock().record(&self.context, ticket, outcome);

        if let Some(transition) = transition {
            self.callbacks.dispatch(&transition);
        }
    }

    /// Current state; never advances a pending Open -> HalfOpen transition
    pub fn state(&self) -> State {
        self.inner.lock().state()
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Check if circuit is half-open (probing)
    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }

    /// Snapshot of the counters accumulated since the last transition
    pub fn counters(&self) -> Counters {
        self.inner.lock().counters()
    }

    /// Clock reading at the last transition (or at construction)
    pub fn state_entered_at(&self) -> f64 {
        self.inner.lock().entered_at
    }

    /// Name used in errors, logs and transitions
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Get the configuration this breaker was built with
    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Zero the counters without changing state
    pub fn reset_counters(&self) {
        let mut inner = self.inner.lock();
        if let Some(counters) = inner.counters_mut() {
            counters.clear();
        }
        debug!(circuit = %self.context.name, "counters reset");
    }

    /// Force the circuit back to Closed with fresh counters
    ///
    /// Calls still in flight when this runs are not counted. Leaving Open or
    /// HalfOpen is reported to the `on_close` listeners.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let from = inner.state();
            let counters = inner.counters();
            let epoch = inner.epoch + 1;

            *inner = Inner::new(&self.context);
            inner.epoch = epoch;
            info!(circuit = %self.context.name, %from, "circuit reset");

            (from != State::Closed).then(|| Transition {
                circuit: self.context.name.clone(),
                from,
                to: State::Closed,
                counters,
                at: inner.entered_at,
            })
        };

        if let Some(transition) = transition {
            self.callbacks.dispatch(&transition);
        }
    }
}

impl Default for CircuitBreaker {
    /// Breaker named [`DEFAULT_NAME`] with the default policies and a 1s cooldown
    fn default() -> Self {
        Self::new(DEFAULT_NAME, Config::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &inner.state())
            .field("counters", &inner.counters())
            .field("state_entered_at", &inner.entered_at)
            .field("config", &self.context.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
