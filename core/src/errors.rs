//! Error types for circuit breaker operations

use crate::State;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call)
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn std::error::Error + Send + Sync>> {
    /// The breaker did not admit the call; the operation was not run
    #[error("Circuit '{circuit}' rejected the call (state: {state})")]
    Rejected { circuit: String, state: State },
    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(E),
}

/// Invalid configuration detected by [`Config::validate`](crate::Config::validate)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be within 0..=100, got {value}")]
    RateOutOfRange { field: &'static str, value: u8 },
    #[error("window_size must be greater than 0")]
    EmptyWindow,
    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    JitterOutOfRange(f64),
}
