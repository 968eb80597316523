//! breaker-window - Circuit breaker driven by a count-based sliding window
//!
//! This crate provides:
//! - A fixed-size ring buffer tracking the last N call outcomes (success, slow, failure)
//! - State machine for circuit breaker lifecycle (Closed → Open → HalfOpen)
//! - Generation fencing so results of calls admitted before a transition are discarded
//! - Asynchronous, single-slot state transition events
//!
//! # Example
//!
//! ```rust
//! use breaker_window::CircuitBreaker;
//! use std::time::{Duration, Instant};
//!
//! let circuit = CircuitBreaker::builder("my_service")
//!     .failure_rate_threshold(50)
//!     .window_size(20)
//!     .minimum_calls(10)
//!     .slow_call_duration(Duration::from_millis(200))
//!     .open_duration(Duration::from_secs(30))
//!     .build();
//!
//! let (permitted, generation) = circuit.acquire();
//! if permitted {
//!     let start = Instant::now();
//!     let result: Result<(), String> = Ok(()); // your service call here
//!     circuit.report(generation, result.is_err(), start.elapsed());
//! } else {
//!     println!("Circuit is {}, skipping call", circuit.state());
//! }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod errors;
pub mod window;

pub use builder::CircuitBuilder;
pub use callbacks::Listener;
pub use circuit::{CircuitBreaker, Config, Snapshot};
pub use classifier::{DefaultClassifier, FailureClassifier, FailureContext, PredicateClassifier};
pub use errors::{CircuitError, ConfigError};
pub use window::{CountWindow, Window, WindowFactory};

use std::fmt;
use std::time::{Duration, SystemTime};

/// Classification of one completed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Slow,
    Fail,
}

impl Outcome {
    /// Fail if the call errored, Slow if it took longer than `slow_call_duration`,
    /// Success otherwise
    pub fn classify(had_error: bool, duration: Duration, slow_call_duration: Duration) -> Self {
        if had_error {
            Outcome::Fail
        } else if duration > slow_call_duration {
            Outcome::Slow
        } else {
            Outcome::Success
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl State {
    /// Numeric code carried by transition events
    pub fn code(self) -> u8 {
        match self {
            State::Closed => 1,
            State::HalfOpen => 2,
            State::Open => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            2 => State::HalfOpen,
            3 => State::Open,
            _ => State::Closed,
        }
    }

    /// Name matching the state machine's state names
    pub fn name(self) -> &'static str {
        match self {
            State::Closed => "Closed",
            State::HalfOpen => "HalfOpen",
            State::Open => "Open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generation token handed out by [`CircuitBreaker::acquire`].
///
/// Bumped on every state transition; a result reported with an older
/// generation is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation(u32);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// A state transition, delivered to the registered listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub circuit: String,
    pub time: SystemTime,
    pub from: State,
    pub to: State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let slow = Duration::from_millis(10);

        assert_eq!(
            Outcome::classify(true, Duration::from_millis(50), slow),
            Outcome::Fail
        );
        assert_eq!(
            Outcome::classify(false, Duration::from_millis(11), slow),
            Outcome::Slow
        );
        // Exactly at the threshold is not slow
        assert_eq!(
            Outcome::classify(false, Duration::from_millis(10), slow),
            Outcome::Success
        );
    }

    #[test]
    fn test_state_codes_round_trip() {
        for state in [State::Closed, State::HalfOpen, State::Open] {
            assert_eq!(State::from_code(state.code()), state);
        }
        assert_eq!(State::Open.to_string(), "Open");
        assert_eq!(State::HalfOpen.code(), 2);
    }

    #[test]
    fn test_generation_wraps() {
        let last = Generation(u32::MAX);
        assert_eq!(last.next().value(), 0);
    }
}
