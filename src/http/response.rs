//! Mapping of gateway failures to HTTP responses.
//!
//! # Design Decisions
//! - A failed fallback is the only error a protected endpoint can produce
//!   and maps to 503 Service Unavailable
//! - The body is JSON so clients can tell gateway errors from backend ones

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::resilience::FallbackError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    dependency: &'a str,
    trigger: &'static str,
    message: String,
}

/// Error returned by protected endpoints.
#[derive(Debug)]
pub struct GatewayError(pub FallbackError);

impl From<FallbackError> for GatewayError {
    fn from(err: FallbackError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::error!(dependency = %self.0.dependency, error = %self.0, "Dependency unavailable");
        let body = ErrorBody {
            error: "dependency_unavailable",
            dependency: &self.0.dependency,
            trigger: self.0.trigger.kind(),
            message: self.0.to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CallError;

    #[tokio::test]
    async fn test_fallback_error_is_503_json() {
        let err = GatewayError(FallbackError {
            dependency: "sample-api".into(),
            trigger: CallError::CircuitOpen { name: "sample-api".into() },
            source: "cache empty".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["dependency"], "sample-api");
        assert_eq!(json["trigger"], "circuit_open");
    }
}
