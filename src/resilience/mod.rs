//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → gate.rs (orchestration entry point)
//!     → bulkhead.rs (bounded concurrency, optional bounded wait)
//!     → circuit_breaker.rs (short-circuit or run, record outcome)
//!     → timeouts.rs (deadline around the operation)
//!     → fallback.rs (substitute value on any failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline unless
//!   explicitly disabled with a zero duration
//! - No retries inside the gate
//! - Breakers and bulkheads live in an explicit registry, never in statics
//! - Observers receive every state change; the gate itself only logs

pub mod bulkhead;
pub mod circuit_breaker;
pub mod error;
pub mod events;
pub mod fallback;
pub mod gate;
pub mod registry;
pub mod timeouts;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadPermit, BulkheadSnapshot};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use error::{BoxError, CallError, FallbackError};
pub use events::{CompositeObserver, NoopObserver, ResilienceEvent, ResilienceObserver};
pub use gate::{CallSite, ResilienceGate};
pub use registry::ResilienceRegistry;
