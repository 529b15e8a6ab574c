//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see transition logs.

use spark_breaker::{CircuitBreaker, FailureRate};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Simulated remote service that fails while `down` is set
struct FlakyService {
    down: std::sync::atomic::AtomicBool,
    hits: AtomicUsize,
}

impl FlakyService {
    fn get(&self, path: &str) -> Result<String, String> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(format!("GET {}: connection refused", path))
        } else {
            Ok(format!("Hello, {:?}", path))
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let service = FlakyService {
        down: std::sync::atomic::AtomicBool::new(false),
        hits: AtomicUsize::new(0),
    };

    let circuit = CircuitBreaker::builder("service_b")
        .trip_policy(Arc::new(FailureRate::new(0.5).minimum_calls(4)))
        .cooldown(Duration::from_millis(500))
        .on_open(|t| println!("🔴 Circuit '{}' opened after {:?}", t.circuit, t.counters))
        .on_close(|t| println!("🟢 Circuit '{}' closed!", t.circuit))
        .on_half_open(|t| println!("🟡 Circuit '{}' half-open, testing...", t.circuit))
        .build();

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(|| service.get(&format!("/items/{}", i))) {
            Ok(body) => println!("✓ {}", body),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Remote goes down ---");
    service.down.store(true, Ordering::SeqCst);
    for i in 1..=3 {
        match circuit.call(|| service.get(&format!("/items/{}", i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) if e.is_rejection() => println!("⛔ {}", e),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Calls while open are not attempted ---");
    let before = service.hits.load(Ordering::SeqCst);
    for _ in 0..3 {
        if let Err(e) = circuit.call(|| service.get("/items")) {
            println!("✗ {}", e);
        }
    }
    println!(
        "Remote hits while open: {}\n",
        service.hits.load(Ordering::SeqCst) - before
    );

    println!("--- Remote recovers, waiting out the cooldown ---");
    service.down.store(false, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(500));

    for _ in 0..2 {
        match circuit.call(|| service.get("/health")) {
            Ok(body) => println!("✓ probe: {}", body),
            Err(e) => println!("✗ {}", e),
        }
        println!("State: {}", circuit.state_name());
    }
}
