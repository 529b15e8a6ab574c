//! Time sources for cooldown tracking
//!
//! - `MonotonicClock`: `Instant`-anchored seconds, immune to NTP adjustments
//! - `ManualClock`: time only moves when told to, for deterministic tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source, in seconds since an arbitrary anchor
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> f64;
}

/// Wall-independent clock anchored at creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start_time: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Clock that only advances when [`ManualClock::advance`] is called
///
/// # Example
///
/// ```rust
/// use spark_breaker::{CircuitBreaker, ManualClock, State};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualClock::new());
/// let circuit = CircuitBreaker::builder("test")
///     .clock(clock.clone())
///     .build();
///
/// let _ = circuit.call(|| Err::<(), _>("down"));
/// assert_eq!(circuit.state(), State::Open);
///
/// clock.advance(Duration::from_secs(1));
/// assert!(circuit.call(|| Ok::<_, &str>("probe")).is_ok());
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst)).as_secs_f64()
    }
}
