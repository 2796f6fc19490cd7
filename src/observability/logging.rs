//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Log resilience events with structured fields
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` takes precedence over the configured level
//! - State transitions log at warn/info, per-call events at debug/trace

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::ObservabilityConfig;
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::events::{ResilienceEvent, ResilienceObserver};

/// Install the global tracing subscriber.
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "resilience_gateway={level},tower_http={level}",
            level = config.log_level.to_ascii_lowercase()
        )
        .into()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Writes every resilience event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ResilienceObserver for LoggingObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        match event {
            ResilienceEvent::StateTransition { breaker, from, to } => match to {
                CircuitState::Open => {
                    tracing::warn!(breaker = %breaker, from = %from, to = %to, "Circuit opened")
                }
                _ => {
                    tracing::info!(breaker = %breaker, from = %from, to = %to, "Circuit state changed")
                }
            },
            ResilienceEvent::FailureRate { breaker, rate, samples } => {
                tracing::trace!(breaker = %breaker, rate, samples, "Failure rate updated");
            }
            ResilienceEvent::CallSucceeded { breaker, elapsed } => {
                tracing::trace!(breaker = %breaker, elapsed_ms = elapsed.as_millis() as u64, "Call succeeded");
            }
            ResilienceEvent::CallFailed { breaker, kind, elapsed } => {
                tracing::debug!(
                    breaker = %breaker,
                    kind = %kind,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Call failed"
                );
            }
            ResilienceEvent::ShortCircuited { breaker, state } => {
                tracing::debug!(breaker = %breaker, state = %state, "Call short-circuited");
            }
            ResilienceEvent::BulkheadAdmitted { bulkhead, in_flight, waited } => {
                tracing::trace!(
                    bulkhead = %bulkhead,
                    in_flight,
                    waited_ms = waited.as_millis() as u64,
                    "Bulkhead admitted call"
                );
            }
            ResilienceEvent::BulkheadRejected { bulkhead, in_flight } => {
                tracing::debug!(bulkhead = %bulkhead, in_flight, "Bulkhead rejected call");
            }
            ResilienceEvent::BulkheadReleased { bulkhead, in_flight } => {
                tracing::trace!(bulkhead = %bulkhead, in_flight, "Bulkhead released slot");
            }
            ResilienceEvent::FallbackInvoked { dependency, trigger } => {
                tracing::info!(dependency = %dependency, trigger = %trigger, "Serving fallback");
            }
            ResilienceEvent::FallbackFailed { dependency, trigger } => {
                tracing::error!(dependency = %dependency, trigger = %trigger, "Fallback failed");
            }
        }
    }
}
