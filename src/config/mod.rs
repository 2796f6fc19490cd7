//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via ArcSwap to the HTTP layer and the resilience registry
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates the new file
//!     → new config sent over a channel
//!     → main swaps it in and reloads the registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A file that fails validation never replaces the running config

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BulkheadOverrides, BulkheadSettings, CircuitBreakerOverrides,
    CircuitBreakerSettings, DownstreamConfig, GatewayConfig, ListenerConfig,
    ObservabilityConfig, ResilienceConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
