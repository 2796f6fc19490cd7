//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::resilience::{BulkheadConfig, CircuitBreakerConfig};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Downstream dependency settings.
    pub downstream: DownstreamConfig,

    /// Circuit breaker and bulkhead settings.
    pub resilience: ResilienceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8765").
    pub bind_address: String,

    /// Whole-request timeout applied by the HTTP layer, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Downstream dependency called by `/sample-api`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DownstreamConfig {
    /// URL fetched by the sample endpoint.
    pub sample_api_url: String,

    /// Deadline for a single downstream call, in milliseconds (0 = none).
    pub call_timeout_ms: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            sample_api_url: "http://localhost:8080/some-sample-url".to_string(),
            call_timeout_ms: 2000,
        }
    }
}

impl DownstreamConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Circuit breaker settings as they appear in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Failure rate in percent that opens the circuit.
    pub failure_rate_threshold: f64,
    pub sliding_window_size: u32,
    pub minimum_samples: u32,
    pub wait_duration_in_open_ms: u64,
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_rate_threshold: defaults.failure_rate_threshold,
            sliding_window_size: defaults.sliding_window_size,
            minimum_samples: defaults.minimum_samples,
            wait_duration_in_open_ms: defaults.wait_duration_in_open.as_millis() as u64,
            permitted_calls_in_half_open: defaults.permitted_calls_in_half_open,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert config settings to the resilience module's `CircuitBreakerConfig`.
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_samples: self.minimum_samples,
            wait_duration_in_open: Duration::from_millis(self.wait_duration_in_open_ms),
            permitted_calls_in_half_open: self.permitted_calls_in_half_open,
        }
    }

    fn merged(&self, overrides: &CircuitBreakerOverrides) -> Self {
        Self {
            failure_rate_threshold: overrides
                .failure_rate_threshold
                .unwrap_or(self.failure_rate_threshold),
            sliding_window_size: overrides
                .sliding_window_size
                .unwrap_or(self.sliding_window_size),
            minimum_samples: overrides.minimum_samples.unwrap_or(self.minimum_samples),
            wait_duration_in_open_ms: overrides
                .wait_duration_in_open_ms
                .unwrap_or(self.wait_duration_in_open_ms),
            permitted_calls_in_half_open: overrides
                .permitted_calls_in_half_open
                .unwrap_or(self.permitted_calls_in_half_open),
        }
    }
}

/// Per-breaker overrides; unset fields inherit `circuit_breaker_defaults`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sliding_window_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_samples: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_duration_in_open_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permitted_calls_in_half_open: Option<u32>,
}

/// Bulkhead settings as they appear in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BulkheadSettings {
    pub max_concurrent_calls: u32,
    pub max_wait_queue_size: u32,
    pub max_wait_duration_ms: u64,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        let defaults = BulkheadConfig::default();
        Self {
            max_concurrent_calls: defaults.max_concurrent_calls,
            max_wait_queue_size: defaults.max_wait_queue_size,
            max_wait_duration_ms: defaults.max_wait_duration.as_millis() as u64,
        }
    }
}

impl BulkheadSettings {
    pub fn to_resilience_config(&self) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent_calls: self.max_concurrent_calls,
            max_wait_queue_size: self.max_wait_queue_size,
            max_wait_duration: Duration::from_millis(self.max_wait_duration_ms),
        }
    }

    fn merged(&self, overrides: &BulkheadOverrides) -> Self {
        Self {
            max_concurrent_calls: overrides
                .max_concurrent_calls
                .unwrap_or(self.max_concurrent_calls),
            max_wait_queue_size: overrides
                .max_wait_queue_size
                .unwrap_or(self.max_wait_queue_size),
            max_wait_duration_ms: overrides
                .max_wait_duration_ms
                .unwrap_or(self.max_wait_duration_ms),
        }
    }
}

/// Per-bulkhead overrides; unset fields inherit `bulkhead_defaults`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BulkheadOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_calls: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_queue_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_duration_ms: Option<u64>,
}

/// Resilience configuration: defaults plus named instances.
///
/// ```toml
/// [resilience.circuit_breaker_defaults]
/// failure_rate_threshold = 50.0
///
/// [resilience.circuit_breakers.sample-api]
/// wait_duration_in_open_ms = 5000
///
/// [resilience.bulkheads.working-api]
/// max_concurrent_calls = 10
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker_defaults: CircuitBreakerSettings,
    pub bulkhead_defaults: BulkheadSettings,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerOverrides>,
    pub bulkheads: BTreeMap<String, BulkheadOverrides>,
}

impl ResilienceConfig {
    /// Effective settings for the breaker `name`.
    pub fn circuit_breaker_settings(&self, name: &str) -> CircuitBreakerSettings {
        match self.circuit_breakers.get(name) {
            Some(overrides) => self.circuit_breaker_defaults.merged(overrides),
            None => self.circuit_breaker_defaults.clone(),
        }
    }

    /// Effective settings for the bulkhead `name`.
    pub fn bulkhead_settings(&self, name: &str) -> BulkheadSettings {
        match self.bulkheads.get(name) {
            Some(overrides) => self.bulkhead_defaults.merged(overrides),
            None => self.bulkhead_defaults.clone(),
        }
    }

    pub fn circuit_breaker(&self, name: &str) -> CircuitBreakerConfig {
        self.circuit_breaker_settings(name).to_resilience_config()
    }

    pub fn bulkhead(&self, name: &str) -> BulkheadConfig {
        self.bulkhead_settings(name).to_resilience_config()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
