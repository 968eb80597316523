//! Basic circuit breaker usage example

use breaker_window::{CircuitBreaker, State};
use std::thread;
use std::time::Duration;

fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = CircuitBreaker::builder("payment_api")
        .failure_rate_threshold(50)
        .slow_rate_threshold(80)
        .window_size(10)
        .minimum_calls(4)
        .half_open_probes(2)
        .slow_call_duration(Duration::from_millis(50))
        .open_duration(Duration::from_millis(500))
        .listener(|event| {
            let marker = match event.to {
                State::Open => "🔴",
                State::HalfOpen => "🟡",
                State::Closed => "🟢",
            };
            println!("{} Circuit '{}': {} -> {}", marker, event.circuit, event.from, event.to);
        })
        .build();

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    for i in 1..=2 {
        match circuit.call(move || Err::<String, _>(format!("Payment failed {}", i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Waiting for cooldown ---");
    thread::sleep(Duration::from_millis(600));

    // Manual protocol: acquire, run, report
    for i in 1..=2 {
        let (permitted, generation) = circuit.acquire();
        if permitted {
            println!("✓ Probe {} admitted", i);
            circuit.report(generation, false, Duration::from_millis(5));
        } else {
            println!("✗ Probe {} denied", i);
        }
    }

    // Give the listener thread a moment to print
    thread::sleep(Duration::from_millis(50));
    println!("State: {}", circuit.state_name());
    println!("Snapshot: {:?}", circuit.snapshot());
}
