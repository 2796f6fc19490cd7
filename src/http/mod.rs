//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (assign and propagate request ID)
//!     → endpoint handler → ResilienceGate
//!         → downstream.rs (outbound call for /sample-api)
//!     → response.rs (map gateway failures to status codes)
//!     → Send to client
//! ```

pub mod downstream;
pub mod request;
pub mod response;
pub mod server;

pub use downstream::{DownstreamClient, DownstreamError};
pub use request::{RequestId, X_REQUEST_ID};
pub use response::GatewayError;
pub use server::{AppState, GatewayServer, FALLBACK_RESPONSE, WORKING_API_RESPONSE};
