//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience components produce ResilienceEvents:
//!     → logging.rs (LoggingObserver, structured log events)
//!     → metrics.rs (MetricsObserver, counters and gauges)
//!
//! HTTP layer produces:
//!     → metrics.rs (request counters and latency)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event for machine parsing
//! - Request ID flows through the HTTP trace span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingObserver};
pub use metrics::{init_metrics, MetricsError, MetricsObserver};
