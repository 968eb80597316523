//! Builder API for ergonomic circuit breaker configuration

use crate::{
    Event, Listener,
    circuit::{CircuitBreaker, CircuitContext, Config},
    classifier::FailureClassifier,
    errors::ConfigError,
    window::{WindowFactory, count_window_factory},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    window_factory: Option<WindowFactory>,
    failure_classifier: Option<Arc<dyn FailureClassifier>>,
    listener: Option<Listener>,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            window_factory: None,
            failure_classifier: None,
            listener: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure rate threshold (percentage, 0-100)
    /// Circuit opens when failed calls make up at least this share of the window
    pub fn failure_rate_threshold(mut self, percent: u8) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    /// Set the slow call rate threshold (percentage, 0-100)
    pub fn slow_rate_threshold(mut self, percent: u8) -> Self {
        self.config.slow_rate_threshold = percent;
        self
    }

    /// Set how many recent outcomes the window remembers
    pub fn window_size(mut self, size: u32) -> Self {
        self.config.window_size = size;
        self
    }

    /// Set the number of probe calls admitted while HalfOpen
    pub fn half_open_probes(mut self, probes: u32) -> Self {
        self.config.half_open_probes = probes;
        self
    }

    /// Set minimum number of outcomes before rates are evaluated
    pub fn minimum_calls(mut self, calls: u32) -> Self {
        self.config.minimum_calls = calls;
        self
    }

    /// Successful calls taking longer than this count as slow
    pub fn slow_call_duration(mut self, duration: Duration) -> Self {
        self.config.slow_call_duration = duration;
        self
    }

    /// Set how long the circuit stays Open before probing
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Restart HalfOpen probing after this long without a verdict
    pub fn max_half_open_duration(mut self, duration: Duration) -> Self {
        self.config.max_half_open_duration = duration;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Use a custom window implementation.
    ///
    /// The factory is called with `window_size` whenever the breaker needs a
    /// fresh window (construction, and every entry into Closed or HalfOpen).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breaker_window::{CircuitBreaker, CountWindow, Window};
    /// use std::sync::Arc;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .window(Arc::new(|capacity: u32| -> Box<dyn Window> {
    ///         Box::new(CountWindow::new(capacity * 2))
    ///     }))
    ///     .build();
    /// assert!(circuit.is_closed());
    /// ```
    pub fn window(mut self, factory: WindowFactory) -> Self {
        self.window_factory = Some(factory);
        self
    }

    /// Set a failure classifier to filter which errors count as failures in `call()`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breaker_window::{CircuitBreaker, PredicateClassifier};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .failure_classifier(Arc::new(PredicateClassifier::new(|ctx| {
    ///         // Only count errors that took a while
    ///         ctx.duration > Duration::from_secs(1)
    ///     })))
    ///     .build();
    /// ```
    pub fn failure_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.failure_classifier = Some(classifier);
        self
    }

    /// Set the state transition listener
    pub fn listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker without checking the configuration
    pub fn build(self) -> CircuitBreaker {
        let window_factory = self.window_factory.unwrap_or_else(count_window_factory);

        let context = CircuitContext {
            name: self.name,
            config: self.config,
        };

        let circuit = CircuitBreaker::with_parts(context, window_factory, self.failure_classifier);
        if let Some(listener) = self.listener {
            circuit.install_listener(listener);
        }
        circuit
    }

    /// Validate the configuration, then build
    pub fn try_build(self) -> Result<CircuitBreaker, ConfigError> {
        self.config.validate()?;
        Ok(self.build())
    }
}

impl std::fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("window_factory", &self.window_factory.is_some())
            .field("failure_classifier", &self.failure_classifier.is_some())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CountWindow, Outcome, State, Window};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.state_name(), "Closed");
        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_rate_threshold(40)
            .slow_rate_threshold(80)
            .window_size(30)
            .half_open_probes(3)
            .minimum_calls(15)
            .slow_call_duration(Duration::from_millis(250))
            .open_duration(Duration::from_secs(10))
            .max_half_open_duration(Duration::from_secs(20))
            .jitter_factor(0.1)
            .build();

        let config = circuit.config();
        assert_eq!(config.failure_rate_threshold, 40);
        assert_eq!(config.slow_rate_threshold, 80);
        assert_eq!(config.window_size, 30);
        assert_eq!(config.half_open_probes, 3);
        assert_eq!(config.minimum_calls, 15);
        assert_eq!(config.slow_call_duration, Duration::from_millis(250));
        assert_eq!(config.open_duration, Duration::from_secs(10));
        assert_eq!(config.max_half_open_duration, Duration::from_secs(20));
        assert_eq!(config.jitter_factor, 0.1);
    }

    #[test]
    fn test_try_build_rejects_invalid_config() {
        let result = CircuitBuilder::new("test").failure_rate_threshold(150).try_build();
        assert!(matches!(result, Err(ConfigError::RateOutOfRange { value: 150, .. })));

        let result = CircuitBuilder::new("test").window_size(0).try_build();
        assert!(matches!(result, Err(ConfigError::EmptyWindow)));

        assert!(CircuitBuilder::new("test").try_build().is_ok());
    }

    #[test]
    fn test_build_does_not_clamp() {
        let circuit = CircuitBuilder::new("test").slow_rate_threshold(120).build();
        assert_eq!(circuit.config().slow_rate_threshold, 120);
    }

    #[test]
    fn test_builder_with_listener() {
        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_rate_threshold(50)
            .minimum_calls(2)
            .window_size(4)
            .listener(move |event| {
                if event.to == State::Open {
                    opened_clone.store(true, Ordering::SeqCst);
                }
            })
            .build();

        for _ in 0..2 {
            let _ = circuit.call(|| Err::<(), _>("error"));
        }
        assert!(circuit.is_open());

        // Delivery is asynchronous
        for _ in 0..200 {
            if opened.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_builder_with_custom_window() {
        let created = Arc::new(AtomicU32::new(0));
        let created_clone = created.clone();

        let circuit = CircuitBuilder::new("test")
            .window_size(3)
            .minimum_calls(1)
            .window(Arc::new(move |capacity: u32| -> Box<dyn Window> {
                created_clone.fetch_add(1, Ordering::SeqCst);
                Box::new(CountWindow::new(capacity))
            }))
            .build();
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let (_, generation) = circuit.acquire();
        circuit.record(generation, Outcome::Success);
        circuit.set_state(State::HalfOpen);
        circuit.set_state(State::Closed);

        // One per entry into HalfOpen and Closed
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }
}
