//! Circuit breaker implementation using state machines
//!
//! The breaker admits calls with [`CircuitBreaker::acquire`] and learns their
//! outcome through [`CircuitBreaker::report`]. Outcomes land in a sliding
//! window owned by the breaker; crossing the failure or slow-call rate
//! threshold trips the circuit open.

use crate::{
    Event, Generation, Outcome, State,
    callbacks::Dispatcher,
    classifier::{FailureClassifier, FailureContext},
    errors::{CircuitError, ConfigError},
    window::{Window, WindowFactory},
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Percentage (0-100) of failed calls in the window that opens the circuit
    pub failure_rate_threshold: u8,

    /// Percentage (0-100) of slow calls in the window that opens the circuit
    pub slow_rate_threshold: u8,

    /// Number of most recent outcomes remembered by the window
    pub window_size: u32,

    /// Number of trial calls admitted while HalfOpen
    pub half_open_probes: u32,

    /// Minimum outcomes in the window before rates are evaluated
    pub minimum_calls: u32,

    /// Successful calls slower than this are recorded as slow
    pub slow_call_duration: Duration,

    /// Time spent Open before the next acquire moves to HalfOpen
    pub open_duration: Duration,

    /// Restart HalfOpen when probing takes longer than this (zero disables)
    pub max_half_open_duration: Duration,

    /// Jitter factor for open_duration (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50,
            slow_rate_threshold: 100,
            window_size: 100,
            half_open_probes: 10,
            minimum_calls: 100,
            slow_call_duration: Duration::from_secs(60),
            open_duration: Duration::from_secs(60),
            max_half_open_duration: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Check value ranges. `CircuitBreaker::new` does not call this; out of
    /// range values are used as given.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_rate_threshold > 100 {
            return Err(ConfigError::RateOutOfRange {
                field: "failure_rate_threshold",
                value: self.failure_rate_threshold,
            });
        }
        if self.slow_rate_threshold > 100 {
            return Err(ConfigError::RateOutOfRange {
                field: "slow_rate_threshold",
                value: self.slow_rate_threshold,
            });
        }
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::JitterOutOfRange(self.jitter_factor));
        }
        Ok(())
    }
}

/// Point-in-time view of the breaker, taken under its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub generation: Generation,
    /// Outcomes in the current window
    pub total: u32,
    pub fail_count: u32,
    pub slow_count: u32,
    /// Probes admitted since HalfOpen was last entered (0 outside HalfOpen)
    pub probes_issued: u32,
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone, Default)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Cooldown picked when the circuit opened (jittered open_duration)
    pub cooldown: Duration,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub probes_issued: u32,
}

// Every ordered pair of distinct states maps onto exactly one event, so
// forced transitions go through the same machine as organic ones.
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            transition: { from: [Closed, Open], to: HalfOpen }
        }
        close {
            transition: { from: [Open, HalfOpen], to: Closed }
        }
    }
}

/// Resolution of the jitter fraction drawn from the retry policy
const JITTER_SCALE: u64 = 1_000_000;

/// Everything guarded by the breaker lock
struct Inner {
    machine: DynamicCircuit,
    window: Box<dyn Window>,
    transit_time: Instant,
    generation: Generation,
}

impl Inner {
    fn state(&self) -> State {
        match self.machine.current_state() {
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            _ => State::Closed,
        }
    }

    fn probes_issued(&self) -> u32 {
        self.machine
            .half_open_data()
            .map(|d| d.probes_issued)
            .unwrap_or(0)
    }
}

/// Circuit breaker public API
///
/// Shareable across threads (`Arc<CircuitBreaker>`); all mutation happens
/// under a single lock held for O(1) work.
pub struct CircuitBreaker {
    context: CircuitContext,
    inner: Mutex<Inner>,
    /// Mirror of the machine state for lock-free reads
    state: AtomicU8,
    window_factory: WindowFactory,
    failure_classifier: Option<Arc<dyn FailureClassifier>>,
    dispatcher: Dispatcher,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let context = CircuitContext {
            name: name.into(),
            config,
        };
        Self::with_parts(context, crate::window::count_window_factory(), None)
    }

    /// Create a circuit breaker from prepared parts (used by builder)
    pub(crate) fn with_parts(
        context: CircuitContext,
        window_factory: WindowFactory,
        failure_classifier: Option<Arc<dyn FailureClassifier>>,
    ) -> Self {
        let inner = Inner {
            machine: DynamicCircuit::new(context.clone()),
            window: window_factory(context.config.window_size),
            transit_time: Instant::now(),
            generation: Generation::default(),
        };
        let dispatcher = Dispatcher::new(&context.name);

        Self {
            context,
            inner: Mutex::new(inner),
            state: AtomicU8::new(State::Closed.code()),
            window_factory,
            failure_classifier,
            dispatcher,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Ask permission to run one call.
    ///
    /// Returns whether the call may proceed and the generation to hand back
    /// to [`report`](Self::report) once it completes.
    pub fn acquire(&self) -> (bool, Generation) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state() == State::Closed {
            return (true, inner.generation);
        }

        let now = Instant::now();
        if inner.state() == State::Open {
            let cooldown = inner
                .machine
                .open_data()
                .map(|d| d.cooldown)
                .unwrap_or(self.context.config.open_duration);
            if now.duration_since(inner.transit_time) < cooldown {
                return (false, inner.generation);
            }
            self.transition(inner, State::HalfOpen, now);
        }

        let generation = inner.generation;
        if let Some(data) = inner.machine.half_open_data_mut()
            && data.probes_issued < self.context.config.half_open_probes
        {
            data.probes_issued += 1;
            return (true, generation);
        }

        // Probe budget spent without a verdict within the cap: restart probing
        let max_half_open = self.context.config.max_half_open_duration;
        if inner.state() == State::HalfOpen
            && !max_half_open.is_zero()
            && now.duration_since(inner.transit_time) > max_half_open
        {
            self.enter(inner, State::HalfOpen, State::HalfOpen, now);
        }

        (false, inner.generation)
    }

    /// Report the result of a call admitted by [`acquire`](Self::acquire).
    ///
    /// Results carrying a generation other than the current one are ignored.
    pub fn report(&self, generation: Generation, had_error: bool, duration: Duration) {
        let outcome = Outcome::classify(
            had_error,
            duration,
            self.context.config.slow_call_duration,
        );
        self.record(generation, outcome);
    }

    /// Same as [`report`](Self::report) with an outcome classified by the caller
    pub fn record(&self, generation: Generation, outcome: Outcome) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.generation != generation {
            tracing::trace!(
                circuit = %self.context.name,
                reported = generation.value(),
                current = inner.generation.value(),
                "discarding stale result"
            );
            return;
        }

        inner.window.push(outcome);

        let config = &self.context.config;
        let state = inner.state();
        let minimum_calls = if state == State::HalfOpen {
            config.minimum_calls.min(config.half_open_probes)
        } else {
            config.minimum_calls
        };
        // The push above keeps total > 0 even when minimum_calls is 0
        if inner.window.total() < minimum_calls {
            return;
        }

        let now = Instant::now();
        if inner.window.fail_rate() >= config.failure_rate_threshold
            || inner.window.slow_rate() >= config.slow_rate_threshold
        {
            self.transition(inner, State::Open, now);
        } else if state == State::HalfOpen {
            self.transition(inner, State::Closed, now);
        }
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation only runs when the breaker admits it. Its error is
    /// recorded as a failure unless the configured failure classifier says
    /// otherwise.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        E: 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let (permitted, generation) = self.acquire();
        if !permitted {
            return Err(CircuitError::Rejected {
                circuit: self.context.name.clone(),
                state: self.state(),
            });
        }

        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        match result {
            Ok(value) => {
                self.report(generation, false, duration);
                Ok(value)
            }
            Err(e) => {
                let counts = match &self.failure_classifier {
                    Some(classifier) => classifier.is_failure(&FailureContext {
                        circuit_name: &self.context.name,
                        error: &e as &dyn std::any::Any,
                        duration,
                    }),
                    None => true,
                };
                self.report(generation, counts, duration);
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Current state. May be stale by the time the caller acts on it;
    /// `acquire` is the authoritative check.
    pub fn state(&self) -> State {
        State::from_code(self.state.load(Ordering::Acquire))
    }

    /// Force a transition, with the same side effects as an organic one
    pub fn set_state(&self, state: State) {
        let mut guard = self.inner.lock();
        self.transition(&mut guard, state, Instant::now());
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Check if circuit is probing recovery
    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Return to Closed with an empty window.
    ///
    /// Results of calls admitted before the reset are discarded even when
    /// the circuit was already Closed.
    pub fn reset(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        if inner.state() == State::Closed {
            inner.window = (self.window_factory)(self.context.config.window_size);
            inner.generation = inner.generation.next();
            inner.transit_time = now;
        } else {
            self.transition(inner, State::Closed, now);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            state: inner.state(),
            generation: inner.generation,
            total: inner.window.total(),
            fail_count: inner.window.fail_count(),
            slow_count: inner.window.slow_count(),
            probes_issued: inner.probes_issued(),
        }
    }

    /// Register the transition listener, replacing any previous one.
    ///
    /// The listener runs on a dedicated thread and never blocks the breaker.
    /// The breaker owns the listener, so a listener that needs the breaker
    /// should hold a `Weak` handle; an `Arc` keeps both alive forever.
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.set(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        self.dispatcher.clear();
    }

    pub(crate) fn install_listener(&self, listener: crate::Listener) {
        self.dispatcher.set(listener);
    }

    fn transition(&self, inner: &mut Inner, to: State, now: Instant) {
        let from = inner.state();
        if from == to {
            return;
        }

        let event = match to {
            State::Open => CircuitEvent::Trip,
            State::HalfOpen => CircuitEvent::AttemptReset,
            State::Closed => CircuitEvent::Close,
        };
        if inner.machine.handle(event).is_err() {
            tracing::error!(
                circuit = %self.context.name,
                from = %from,
                to = %to,
                "state machine rejected transition"
            );
            return;
        }

        self.enter(inner, from, to, now);
    }

    /// Apply the entry side effects of `to`; also used to restart HalfOpen
    fn enter(&self, inner: &mut Inner, from: State, to: State, now: Instant) {
        let config = &self.context.config;

        inner.transit_time = now;
        inner.generation = inner.generation.next();

        match to {
            State::Closed => {
                inner.window = (self.window_factory)(config.window_size);
            }
            State::HalfOpen => {
                inner.window = (self.window_factory)(config.window_size);
                if let Some(data) = inner.machine.half_open_data_mut() {
                    *data = HalfOpenData::default();
                }
            }
            State::Open => {
                let cooldown = self.open_cooldown();
                if let Some(data) = inner.machine.open_data_mut() {
                    data.cooldown = cooldown;
                }
            }
        }
        self.state.store(to.code(), Ordering::Release);

        let generation = inner.generation.value();
        match (from, to) {
            (_, State::Open) => tracing::warn!(
                circuit = %self.context.name,
                from = %from,
                generation,
                "circuit opened"
            ),
            (State::HalfOpen, State::HalfOpen) => tracing::debug!(
                circuit = %self.context.name,
                generation,
                "half-open probing restarted"
            ),
            _ => tracing::info!(
                circuit = %self.context.name,
                from = %from,
                to = %to,
                generation,
                "circuit state changed"
            ),
        }

        self.dispatcher.emit(Event {
            circuit: self.context.name.clone(),
            time: SystemTime::now(),
            from,
            to,
        });
    }

    fn open_cooldown(&self) -> Duration {
        let config = &self.context.config;
        if config.jitter_factor > 0.0 {
            // The policy runs on a fixed scale; the resulting fraction is
            // applied to the full-precision open_duration.
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: JITTER_SCALE,
                multiplier: 1.0,
                max_delay_ms: JITTER_SCALE,
            };
            let fraction =
                policy.calculate_delay(1, config.jitter_factor) as f64 / JITTER_SCALE as f64;
            Duration::try_from_secs_f64(config.open_duration.as_secs_f64() * fraction)
                .map(|cooldown| cooldown.min(config.open_duration))
                .unwrap_or(config.open_duration)
        } else {
            config.open_duration
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("context", &self.context)
            .field("state", &self.state())
            .field(
                "failure_classifier",
                &self
                    .failure_classifier
                    .as_ref()
                    .map(|_| "<dyn FailureClassifier>"),
            )
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
