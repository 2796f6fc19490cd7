//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls go straight to the fallback
//! - Half-Open: a limited number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate >= threshold over the rolling window
//!                (once the window holds minimum_samples outcomes)
//! Open → Half-Open: first call attempt after wait_duration_in_open
//! Half-Open → Closed: a probe succeeds (window is cleared)
//! Half-Open → Open: a probe fails (opened_at is refreshed)
//! ```
//!
//! # Design Decisions
//! - One mutex per breaker; never held across the downstream call
//! - Every transition bumps a generation counter. Outcomes of calls admitted
//!   under an older generation are discarded, so concurrent failures trip the
//!   breaker once
//! - Short-circuited calls are not failure samples

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::resilience::error::{BoxError, CallError, FallbackError};
use crate::resilience::events::{NoopObserver, ResilienceEvent, ResilienceObserver};
use crate::resilience::fallback::run_fallback;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for gauges (0=closed, 1=open, 2=half-open).
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure rate (percent, 0-100] at which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes kept in the rolling window.
    pub sliding_window_size: u32,
    /// Outcomes required in the window before the rate is evaluated.
    pub minimum_samples: u32,
    /// Time spent in `Open` before probing.
    pub wait_duration_in_open: Duration,
    /// Concurrent probe calls allowed in `HalfOpen`.
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_samples: 5,
            wait_duration_in_open: Duration::from_secs(10),
            permitted_calls_in_half_open: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_rate_threshold(mut self, percent: f64) -> Self {
        self.failure_rate_threshold = percent;
        self
    }

    pub fn with_sliding_window_size(mut self, size: u32) -> Self {
        self.sliding_window_size = size;
        self
    }

    pub fn with_minimum_samples(mut self, samples: u32) -> Self {
        self.minimum_samples = samples;
        self
    }

    pub fn with_wait_duration_in_open(mut self, wait: Duration) -> Self {
        self.wait_duration_in_open = wait;
        self
    }

    pub fn with_permitted_calls_in_half_open(mut self, calls: u32) -> Self {
        self.permitted_calls_in_half_open = calls;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: VecDeque<Outcome>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    generation: u64,
}

impl Inner {
    fn failures(&self) -> usize {
        self.window.iter().filter(|o| **o == Outcome::Failure).count()
    }

    fn failure_rate(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.failures() as f64 * 100.0 / self.window.len() as f64)
    }
}

/// Point-in-time view of a breaker, for admin endpoints and tests.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Failure rate in percent over the current window, if non-empty.
    pub failure_rate: Option<f64>,
    pub samples: usize,
    pub failures: usize,
    /// Remaining time before probing is allowed, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub half_open_in_flight: u32,
    pub failure_rate_threshold: f64,
    pub sliding_window_size: u32,
    pub minimum_samples: u32,
    pub wait_duration_in_open_ms: u64,
    pub permitted_calls_in_half_open: u32,
}

/// Per-dependency circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    observer: Arc<dyn ResilienceObserver>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker that reports to no one.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_observer(name, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        observer: Arc<dyn ResilienceObserver>,
    ) -> Self {
        let capacity = config.sliding_window_size as usize;
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(capacity),
                opened_at: None,
                half_open_in_flight: 0,
                generation: 0,
            }),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current stored state. `Open` is reported until a call attempt moves
    /// the breaker to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply a transition under the lock. Returns the event to emit once the
    /// lock is released.
    fn transition_locked(
        &self,
        inner: &mut Inner,
        to: CircuitState,
        now: Instant,
    ) -> ResilienceEvent {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.half_open_in_flight = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(now),
            CircuitState::Closed => {
                inner.window.clear();
                inner.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }
        ResilienceEvent::StateTransition {
            breaker: self.name.clone(),
            from,
            to,
        }
    }

    fn emit(&self, events: Vec<ResilienceEvent>) {
        for event in &events {
            if let ResilienceEvent::StateTransition { from, to, .. } = event {
                tracing::debug!(breaker = %self.name, %from, %to, "Circuit breaker state transition");
            }
            self.observer.on_event(event);
        }
    }

    /// Ask for permission to call the dependency.
    ///
    /// Returns `CallError::CircuitOpen` when the call must be short-circuited.
    /// The returned permit must be settled with `on_success`/`on_failure`;
    /// dropping it unsettled gives a probe slot back without an outcome.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CallError> {
        let now = Instant::now();
        let mut events = Vec::new();

        let decision = {
            let mut inner = self.lock();
            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.wait_duration_in_open {
                    events.push(self.transition_locked(&mut inner, CircuitState::HalfOpen, now));
                }
            }

            let state = inner.state;
            match state {
                CircuitState::Closed => Ok((inner.generation, false)),
                CircuitState::HalfOpen
                    if inner.half_open_in_flight < self.config.permitted_calls_in_half_open =>
                {
                    inner.half_open_in_flight += 1;
                    Ok((inner.generation, true))
                }
                state => Err(state),
            }
        };

        match decision {
            Ok((generation, probe)) => {
                self.emit(events);
                Ok(CallPermit {
                    breaker: self,
                    generation,
                    probe,
                    started: now,
                    settled: false,
                })
            }
            Err(state) => {
                events.push(ResilienceEvent::ShortCircuited {
                    breaker: self.name.clone(),
                    state,
                });
                self.emit(events);
                tracing::debug!(breaker = %self.name, %state, "Call short-circuited");
                Err(CallError::CircuitOpen {
                    name: self.name.clone(),
                })
            }
        }
    }

    fn record(&self, generation: u64, probe: bool, outcome: Outcome, elapsed: Duration, kind: &'static str) {
        let now = Instant::now();
        let mut events = vec![match outcome {
            Outcome::Success => ResilienceEvent::CallSucceeded {
                breaker: self.name.clone(),
                elapsed,
            },
            Outcome::Failure => ResilienceEvent::CallFailed {
                breaker: self.name.clone(),
                kind,
                elapsed,
            },
        }];

        {
            let mut inner = self.lock();
            if generation != inner.generation {
                // Admitted before the latest transition.
                tracing::trace!(breaker = %self.name, ?outcome, "Discarding stale outcome");
            } else {
                if probe {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                }
                let state = inner.state;
                match state {
                    CircuitState::Closed => {
                        inner.window.push_back(outcome);
                        while inner.window.len() > self.config.sliding_window_size as usize {
                            inner.window.pop_front();
                        }
                        let samples = inner.window.len();
                        let rate = inner.failure_rate().unwrap_or(0.0);
                        events.push(ResilienceEvent::FailureRate {
                            breaker: self.name.clone(),
                            rate,
                            samples,
                        });
                        if samples >= self.config.minimum_samples as usize
                            && rate >= self.config.failure_rate_threshold
                        {
                            events.push(self.transition_locked(&mut inner, CircuitState::Open, now));
                        }
                    }
                    CircuitState::HalfOpen => {
                        let to = match outcome {
                            Outcome::Success => CircuitState::Closed,
                            Outcome::Failure => CircuitState::Open,
                        };
                        events.push(self.transition_locked(&mut inner, to, now));
                    }
                    CircuitState::Open => {
                        tracing::warn!(breaker = %self.name, "Outcome recorded while circuit is OPEN");
                    }
                }
            }
        }

        self.emit(events);
    }

    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Run `operation` under the breaker without a fallback.
    ///
    /// Only `Downstream` and `Timeout` errors are recorded as failures; any
    /// other error is passed through without touching the window.
    pub async fn call<T, Op, Fut>(&self, operation: Op) -> Result<T, CallError>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let permit = self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                permit.on_success();
                Ok(value)
            }
            Err(err) => {
                permit.on_failure(&err);
                Err(err)
            }
        }
    }

    /// Run `operation` under the breaker, substituting `fallback` on failure
    /// or short-circuit.
    pub async fn execute<T, Op, Fut, Fb, FbFut>(
        &self,
        operation: Op,
        fallback: Fb,
    ) -> Result<T, FallbackError>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
        Fb: FnOnce(CallError) -> FbFut,
        FbFut: Future<Output = Result<T, BoxError>>,
    {
        match self.call(operation).await {
            Ok(value) => Ok(value),
            Err(err) => run_fallback(&self.name, err, fallback, self.observer.as_ref()).await,
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let inner = self.lock();
        let open_remaining_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = now.saturating_duration_since(at);
                Some(
                    self.config
                        .wait_duration_in_open
                        .saturating_sub(elapsed)
                        .as_millis() as u64,
                )
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: inner.failure_rate(),
            samples: inner.window.len(),
            failures: inner.failures(),
            open_remaining_ms,
            half_open_in_flight: inner.half_open_in_flight,
            failure_rate_threshold: self.config.failure_rate_threshold,
            sliding_window_size: self.config.sliding_window_size,
            minimum_samples: self.config.minimum_samples,
            wait_duration_in_open_ms: self.config.wait_duration_in_open.as_millis() as u64,
            permitted_calls_in_half_open: self.config.permitted_calls_in_half_open,
        }
    }
}

/// Permission to make one call through a breaker.
#[must_use = "a permit must be settled with on_success or on_failure"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    started: Instant,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn on_success(mut self) {
        self.settled = true;
        self.breaker.record(
            self.generation,
            self.probe,
            Outcome::Success,
            self.started.elapsed(),
            "success",
        );
    }

    /// Record `error` as a failure sample.
    ///
    /// Errors that are not failure samples (`CircuitOpen`, `BulkheadFull`)
    /// release the permit without touching the window.
    pub fn on_failure(mut self, error: &CallError) {
        if !error.is_failure_sample() {
            return;
        }
        self.settled = true;
        self.breaker.record(
            self.generation,
            self.probe,
            Outcome::Failure,
            self.started.elapsed(),
            error.kind(),
        );
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release(self.generation);
        }
    }
}
