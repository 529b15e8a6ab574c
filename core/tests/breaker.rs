use spark_breaker::{CircuitBreaker, CircuitError, Counters, ManualClock, State};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

#[derive(Debug, PartialEq)]
struct RemoteError(&'static str);

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for RemoteError {}

fn succeed() -> Result<&'static str, RemoteError> {
    Ok("pong")
}

fn fail() -> Result<&'static str, RemoteError> {
    Err(RemoteError("503 service unavailable"))
}

#[test]
fn default_breaker_scenario() {
    let circuit = CircuitBreaker::default();

    assert_eq!(circuit.call(succeed).unwrap(), "pong");
    assert_eq!(circuit.call(succeed).unwrap(), "pong");
    assert_eq!(circuit.state(), State::Closed);
    assert_eq!(
        circuit.counters(),
        Counters {
            success: 2,
            ..Default::default()
        }
    );

    // 1/3 failed
    let err = circuit.call(fail).unwrap_err();
    assert_eq!(err.execution(), Some(&RemoteError("503 service unavailable")));
    assert_eq!(circuit.state(), State::Closed);

    // 2/4 failed
    assert!(!circuit.call(fail).unwrap_err().is_rejection());
    assert_eq!(circuit.state(), State::Open);
    assert!(circuit.counters().is_empty());

    match circuit.call(succeed) {
        Err(CircuitError::Open { circuit: name, .. }) => assert_eq!(name, "Service-B Proxy"),
        other => panic!("expected rejection, got {:?}", other),
    }

    thread::sleep(Duration::from_secs(1));

    assert_eq!(circuit.call(succeed).unwrap(), "pong");
    assert_eq!(circuit.state(), State::HalfOpen);
    assert_eq!(circuit.counters().success, 1);
}

#[test]
fn execution_error_is_distinguishable_from_rejection() {
    let circuit = CircuitBreaker::builder("orders")
        .clock(Arc::new(ManualClock::new()))
        .build();

    let failed = circuit.call(fail).unwrap_err();
    let rejected = circuit.call(fail).unwrap_err();

    assert!(matches!(failed, CircuitError::Execution(RemoteError(_))));
    assert!(rejected.is_rejection());
    assert!(rejected.execution().is_none());
}

#[test]
fn boxed_errors_keep_their_source() {
    let circuit = CircuitBreaker::default();

    let result = circuit.call(|| -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(RemoteError("timeout talking to upstream")))
    });

    let err: CircuitError = result.unwrap_err();
    let inner = err.into_execution().expect("call was attempted");
    assert_eq!(inner.to_string(), "timeout talking to upstream");
    assert!(inner.downcast_ref::<RemoteError>().is_some());
}

#[test]
fn concurrent_calls_keep_counters_consistent() {
    const THREADS: usize = 8;
    const CALLS: usize = 250;

    let circuit = Arc::new(
        CircuitBreaker::builder("concurrent")
            .trip_when(|_: &Counters| false)
            .build(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let circuit = Arc::clone(&circuit);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..CALLS {
                    if (t + i) % 3 == 0 {
                        let _ = circuit.call(fail);
                    } else {
                        let _ = circuit.call(succeed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let counters = circuit.counters();
    assert_eq!(counters.total(), (THREADS * CALLS) as u64);
    assert_eq!(circuit.state(), State::Closed);
}

#[test]
fn concurrent_successes_all_counted() {
    let circuit = Arc::new(CircuitBreaker::default());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let circuit = Arc::clone(&circuit);
            thread::spawn(move || {
                for _ in 0..100 {
                    circuit.call(succeed).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(circuit.counters().success, 1600);
    assert_eq!(circuit.counters().failure, 0);
}

#[test]
fn slow_call_does_not_block_other_callers() {
    let circuit = Arc::new(CircuitBreaker::default());
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    let slow = {
        let circuit = Arc::clone(&circuit);
        thread::spawn(move || {
            circuit.call(|| {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, RemoteError>("slow")
            })
        })
    };

    started_rx.recv().unwrap();

    // The slow call is parked inside its work; these must not wait for it
    for _ in 0..10 {
        circuit.call(succeed).unwrap();
    }
    assert_eq!(circuit.counters().success, 10);

    release_tx.send(()).unwrap();
    assert_eq!(slow.join().unwrap().unwrap(), "slow");
    assert_eq!(circuit.counters().success, 11);
}

#[test]
fn half_open_admits_one_probe_at_a_time() {
    let clock = Arc::new(ManualClock::new());
    let circuit = Arc::new(
        CircuitBreaker::builder("probe")
            .clock(clock.clone())
            .build(),
    );

    let _ = circuit.call(fail);
    assert_eq!(circuit.state(), State::Open);
    clock.advance(Duration::from_secs(1));

    let invoked = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    let probe = {
        let circuit = Arc::clone(&circuit);
        let invoked = Arc::clone(&invoked);
        thread::spawn(move || {
            circuit.call(|| {
                invoked.fetch_add(1, Ordering::SeqCst);
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                succeed()
            })
        })
    };

    started_rx.recv().unwrap();
    assert_eq!(circuit.state(), State::HalfOpen);

    let contenders: Vec<_> = (0..4)
        .map(|_| {
            let circuit = Arc::clone(&circuit);
            let invoked = Arc::clone(&invoked);
            thread::spawn(move || {
                circuit.call(|| {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    succeed()
                })
            })
        })
        .collect();

    for contender in contenders {
        let result = contender.join().unwrap();
        assert!(matches!(
            result,
            Err(CircuitError::HalfOpenLimitReached { .. })
        ));
    }

    release_tx.send(()).unwrap();
    assert_eq!(probe.join().unwrap().unwrap(), "pong");
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(circuit.counters().success, 1);

    circuit.call(succeed).unwrap();
    assert_eq!(circuit.state(), State::Closed);
}

#[test]
fn panic_is_recorded_then_resumed() {
    let circuit = Arc::new(
        CircuitBreaker::builder("panics")
            .trip_when(|c: &Counters| c.failure >= 2)
            .build(),
    );

    let worker = {
        let circuit = Arc::clone(&circuit);
        thread::spawn(move || {
            let _ = circuit.call(|| -> Result<(), RemoteError> { panic!("worker crashed") });
        })
    };

    let payload = worker.join().unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker crashed"));
    assert_eq!(circuit.counters().failure, 1);

    let _ = circuit.call(fail);
    assert_eq!(circuit.state(), State::Open);
}
