//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges for every breaker and bulkhead, defaults and
//!   named overrides alike
//! - Check that addresses and the downstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BulkheadSettings, CircuitBreakerSettings, GatewayConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if let Err(e) = url::Url::parse(&config.downstream.sample_api_url) {
        errors.push(ValidationError::new(
            "downstream.sample_api_url",
            format!("invalid URL: {e}"),
        ));
    }

    let resilience = &config.resilience;
    check_breaker(
        &mut errors,
        "resilience.circuit_breaker_defaults",
        &resilience.circuit_breaker_defaults,
    );
    for name in resilience.circuit_breakers.keys() {
        check_breaker(
            &mut errors,
            &format!("resilience.circuit_breakers.{name}"),
            &resilience.circuit_breaker_settings(name),
        );
    }
    check_bulkhead(
        &mut errors,
        "resilience.bulkhead_defaults",
        &resilience.bulkhead_defaults,
    );
    for name in resilience.bulkheads.keys() {
        check_bulkhead(
            &mut errors,
            &format!("resilience.bulkheads.{name}"),
            &resilience.bulkhead_settings(name),
        );
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{value}' is not a valid socket address"),
        ));
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, prefix: &str, cb: &CircuitBreakerSettings) {
    if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::new(
            format!("{prefix}.failure_rate_threshold"),
            "must be in (0, 100]",
        ));
    }
    if cb.sliding_window_size == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.sliding_window_size"),
            "must be at least 1",
        ));
    }
    if cb.minimum_samples == 0 || cb.minimum_samples > cb.sliding_window_size {
        errors.push(ValidationError::new(
            format!("{prefix}.minimum_samples"),
            "must be between 1 and sliding_window_size",
        ));
    }
    if cb.permitted_calls_in_half_open == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.permitted_calls_in_half_open"),
            "must be at least 1",
        ));
    }
}

fn check_bulkhead(errors: &mut Vec<ValidationError>, prefix: &str, bh: &BulkheadSettings) {
    if bh.max_concurrent_calls == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.max_concurrent_calls"),
            "must be at least 1",
        ));
    }
    if bh.max_wait_queue_size > 0 && bh.max_wait_duration_ms == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.max_wait_duration_ms"),
            "must be greater than 0 when max_wait_queue_size is set",
        ));
    }
}
