//! Listeners for circuit breaker state transitions
//!
//! Listeners are dispatched after the breaker's lock is released, so they may
//! inspect or call the breaker that notified them.

use crate::{Counters, State};
use std::sync::Arc;

/// A completed state transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub circuit: String,
    pub from: State,
    pub to: State,
    /// Counters accumulated in `from`, right before they were cleared
    pub counters: Counters,
    /// Clock reading at the moment of the transition, in seconds
    pub at: f64,
}

pub type Listener = Arc<dyn Fn(&Transition) + Send + Sync>;

/// Listeners keyed by the state being entered
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Listener>,
    pub on_close: Option<Listener>,
    pub on_half_open: Option<Listener>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a transition to the listener registered for its target state
    pub fn dispatch(&self, transition: &Transition) {
        let listener = match transition.to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = listener {
            callback(transition);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
