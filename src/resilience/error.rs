//! Error taxonomy for protected calls.
//!
//! `CallError` is what the fallback receives. Only `FallbackError` ever leaves
//! the gate: it means the primary path and the fallback both failed.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by downstream operations and fallbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reason a protected call was diverted to its fallback.
#[derive(Debug, Error)]
pub enum CallError {
    /// The downstream operation returned an error.
    #[error("downstream error: {0}")]
    Downstream(#[source] BoxError),

    /// The downstream operation did not complete within its deadline.
    #[error("downstream call timed out after {0:?}")]
    Timeout(Duration),

    /// The circuit breaker short-circuited the call.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// The bulkhead had no free slot for the call.
    #[error("bulkhead '{name}' is full")]
    BulkheadFull { name: String },
}

impl CallError {
    /// Wrap any downstream error.
    pub fn downstream<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        CallError::Downstream(err.into())
    }

    /// Whether this outcome counts as a failure sample for the circuit breaker.
    pub fn is_failure_sample(&self) -> bool {
        matches!(self, CallError::Downstream(_) | CallError::Timeout(_))
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Downstream(_) => "downstream",
            CallError::Timeout(_) => "timeout",
            CallError::CircuitOpen { .. } => "circuit_open",
            CallError::BulkheadFull { .. } => "bulkhead_full",
        }
    }
}

/// The fallback itself failed. Never retried or substituted.
#[derive(Debug, Error)]
#[error("fallback for '{dependency}' failed after {trigger}: {source}")]
pub struct FallbackError {
    /// Dependency (breaker name) of the call site.
    pub dependency: String,
    /// The error that triggered the fallback.
    pub trigger: CallError,
    /// The fallback's own error.
    #[source]
    pub source: BoxError,
}
