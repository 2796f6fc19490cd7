//! Observation hook for breaker and bulkhead activity.
//!
//! # Responsibilities
//! - Describe everything the gate does as a `ResilienceEvent`
//! - Fan events out to any number of observers
//!
//! # Design Decisions
//! - Observers are called after internal locks are released
//! - Observers must not block; they run on the caller's task

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

use crate::resilience::circuit_breaker::CircuitState;

/// Something observable happened inside the gate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResilienceEvent {
    /// A circuit breaker changed state.
    StateTransition {
        breaker: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// Failure rate over the breaker's rolling window after a recorded outcome.
    FailureRate {
        breaker: String,
        rate: f64,
        samples: usize,
    },
    /// The operation completed successfully.
    CallSucceeded {
        breaker: String,
        elapsed: Duration,
    },
    /// The operation failed (downstream error or timeout).
    CallFailed {
        breaker: String,
        kind: &'static str,
        elapsed: Duration,
    },
    /// The breaker refused the call without invoking the operation.
    ShortCircuited {
        breaker: String,
        state: CircuitState,
    },
    /// The bulkhead admitted a call.
    BulkheadAdmitted {
        bulkhead: String,
        in_flight: usize,
        waited: Duration,
    },
    /// The bulkhead rejected a call.
    BulkheadRejected {
        bulkhead: String,
        in_flight: usize,
    },
    /// An admitted call gave its bulkhead slot back.
    BulkheadReleased {
        bulkhead: String,
        in_flight: usize,
    },
    /// A fallback was invoked.
    FallbackInvoked {
        dependency: String,
        trigger: &'static str,
    },
    /// The fallback failed; the error is surfaced to the caller.
    FallbackFailed {
        dependency: String,
        trigger: &'static str,
    },
}

/// Consumer of resilience events (logging, metrics, tests).
pub trait ResilienceObserver: Send + Sync {
    fn on_event(&self, event: &ResilienceEvent);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResilienceObserver for NoopObserver {
    fn on_event(&self, _event: &ResilienceEvent) {}
}

/// Forwards each event to every inner observer, in order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ResilienceObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the chain.
    pub fn with(mut self, observer: Arc<dyn ResilienceObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl ResilienceObserver for CompositeObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Records events in memory. Handy for assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<ResilienceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// All state transitions recorded so far, as `(from, to)` pairs.
    pub fn transitions(&self) -> Vec<(CircuitState, CircuitState)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ResilienceEvent::StateTransition { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

impl ResilienceObserver for RecordingObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}
