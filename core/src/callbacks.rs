//! Listener slot and asynchronous delivery of state transition events

use crate::Event;
use parking_lot::{Mutex, RwLock};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;

/// Listener invoked for every state transition
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Single-slot listener plus the worker thread that feeds it.
///
/// Events are queued on an unbounded channel, so `emit` never blocks the
/// caller holding the breaker lock. The worker is spawned with the first
/// listener and exits once the dispatcher is dropped.
pub(crate) struct Dispatcher {
    circuit: String,
    listener: Arc<RwLock<Option<Listener>>>,
    sender: Mutex<Option<Sender<Event>>>,
}

impl Dispatcher {
    pub fn new(circuit: &str) -> Self {
        Self {
            circuit: circuit.to_string(),
            listener: Arc::new(RwLock::new(None)),
            sender: Mutex::new(None),
        }
    }

    /// Install `listener`, replacing any previous one
    pub fn set(&self, listener: Listener) {
        *self.listener.write() = Some(listener);

        let mut sender = self.sender.lock();
        if sender.is_none() {
            *sender = self.spawn_worker();
        }
    }

    pub fn clear(&self) {
        *self.listener.write() = None;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Queue `event` for the listener, if one is registered
    pub fn emit(&self, event: Event) {
        if !self.has_listener() {
            return;
        }
        if let Some(sender) = self.sender.lock().as_ref() {
            // The worker only goes away together with the dispatcher
            let _ = sender.send(event);
        }
    }

    fn spawn_worker(&self) -> Option<Sender<Event>> {
        let (tx, rx) = mpsc::channel::<Event>();
        let listener = Arc::clone(&self.listener);
        let circuit = self.circuit.clone();

        let spawned = thread::Builder::new()
            .name(format!("breaker-{}-events", self.circuit))
            .spawn(move || {
                for event in rx {
                    let current = listener.read().clone();
                    let Some(callback) = current else { continue };

                    if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                        tracing::warn!(
                            circuit = %circuit,
                            from = %event.from,
                            to = %event.to,
                            "circuit listener panicked"
                        );
                    }
                }
            });

        match spawned {
            Ok(_) => Some(tx),
            Err(err) => {
                tracing::warn!(
                    circuit = %self.circuit,
                    error = %err,
                    "failed to start event dispatcher, transition events will be dropped"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("circuit", &self.circuit)
            .field("listener", &self.has_listener())
            .finish()
    }
}
