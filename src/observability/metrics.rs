//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, breaker state, bulkhead usage)
//! - Expose Prometheus-compatible metrics endpoint
//! - Translate resilience events into counters and gauges
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by endpoint, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_circuit_transitions_total` (counter): by breaker, target state
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_circuit_failure_rate` (gauge): percent over the rolling window
//! - `gateway_calls_total` (counter): by breaker, outcome
//! - `gateway_bulkhead_in_flight` (gauge): admitted, unreleased calls
//! - `gateway_bulkhead_rejections_total` (counter)
//! - `gateway_fallbacks_total` (counter): by dependency, trigger
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are names from configuration, never request data

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::events::{ResilienceEvent, ResilienceObserver};

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder and start its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record a finished HTTP request.
pub fn record_request(endpoint: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "gateway_request_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Publishes resilience events as Prometheus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl ResilienceObserver for MetricsObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        match event {
            ResilienceEvent::StateTransition { breaker, to, .. } => {
                counter!(
                    "gateway_circuit_transitions_total",
                    "breaker" => breaker.clone(),
                    "to" => to.to_string()
                )
                .increment(1);
                gauge!("gateway_circuit_state", "breaker" => breaker.clone()).set(to.as_gauge());
            }
            ResilienceEvent::FailureRate { breaker, rate, .. } => {
                gauge!("gateway_circuit_failure_rate", "breaker" => breaker.clone()).set(*rate);
            }
            ResilienceEvent::CallSucceeded { breaker, .. } => {
                counter!(
                    "gateway_calls_total",
                    "breaker" => breaker.clone(),
                    "outcome" => "success"
                )
                .increment(1);
            }
            ResilienceEvent::CallFailed { breaker, kind, .. } => {
                counter!(
                    "gateway_calls_total",
                    "breaker" => breaker.clone(),
                    "outcome" => *kind
                )
                .increment(1);
            }
            ResilienceEvent::ShortCircuited { breaker, .. } => {
                counter!(
                    "gateway_calls_total",
                    "breaker" => breaker.clone(),
                    "outcome" => "short_circuited"
                )
                .increment(1);
            }
            // Events from concurrent calls arrive in any order, so the gauge
            // moves by deltas instead of taking the reported count.
            ResilienceEvent::BulkheadAdmitted { bulkhead, .. } => {
                gauge!("gateway_bulkhead_in_flight", "bulkhead" => bulkhead.clone())
                    .increment(1.0);
            }
            ResilienceEvent::BulkheadReleased { bulkhead, .. } => {
                gauge!("gateway_bulkhead_in_flight", "bulkhead" => bulkhead.clone())
                    .decrement(1.0);
            }
            ResilienceEvent::BulkheadRejected { bulkhead, .. } => {
                counter!("gateway_bulkhead_rejections_total", "bulkhead" => bulkhead.clone())
                    .increment(1);
            }
            ResilienceEvent::FallbackInvoked { dependency, trigger } => {
                counter!(
                    "gateway_fallbacks_total",
                    "dependency" => dependency.clone(),
                    "trigger" => *trigger
                )
                .increment(1);
            }
            ResilienceEvent::FallbackFailed { dependency, trigger } => {
                counter!(
                    "gateway_fallback_failures_total",
                    "dependency" => dependency.clone(),
                    "trigger" => *trigger
                )
                .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::resilience::circuit_breaker::CircuitState;

    // Without an installed recorder the macros are no-ops; this only checks
    // that every event kind is handled without panicking.
    #[test]
    fn test_observer_handles_every_event() {
        let observer = MetricsObserver;
        let events = [
            ResilienceEvent::StateTransition {
                breaker: "sample-api".into(),
                from: CircuitState::Closed,
                to: CircuitState::Open,
            },
            ResilienceEvent::FailureRate { breaker: "sample-api".into(), rate: 60.0, samples: 5 },
            ResilienceEvent::CallSucceeded { breaker: "default".into(), elapsed: Duration::ZERO },
            ResilienceEvent::CallFailed {
                breaker: "sample-api".into(),
                kind: "timeout",
                elapsed: Duration::from_millis(5),
            },
            ResilienceEvent::ShortCircuited { breaker: "sample-api".into(), state: CircuitState::Open },
            ResilienceEvent::BulkheadAdmitted {
                bulkhead: "working-api".into(),
                in_flight: 1,
                waited: Duration::ZERO,
            },
            ResilienceEvent::BulkheadRejected { bulkhead: "working-api".into(), in_flight: 1 },
            ResilienceEvent::BulkheadReleased { bulkhead: "working-api".into(), in_flight: 0 },
            ResilienceEvent::FallbackInvoked { dependency: "sample-api".into(), trigger: "circuit_open" },
            ResilienceEvent::FallbackFailed { dependency: "sample-api".into(), trigger: "circuit_open" },
        ];
        for event in &events {
            observer.on_event(event);
        }
        record_request("/working-api", 200, Instant::now());
    }
}
