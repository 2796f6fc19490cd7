//! Admin API: breaker and bulkhead introspection behind a bearer key.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::{get_dependencies, get_status};

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/dependencies", get(get_dependencies))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::GatewayConfig;
    use crate::resilience::{ResilienceGate, ResilienceRegistry};

    fn router() -> Router {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "secret".into();
        let gate = ResilienceGate::new(Arc::new(ResilienceRegistry::default()));
        gate.registry().circuit_breaker("sample-api");
        gate.registry().bulkhead("sample-api");
        setup_admin_router(AppState::new(config, gate))
    }

    fn request(path: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_key() {
        let response = router().oneshot(request("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(request("/admin/status", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dependencies_lists_snapshots() {
        let response = router()
            .oneshot(request("/admin/dependencies", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["circuit_breakers"][0]["name"], "sample-api");
        assert_eq!(json["circuit_breakers"][0]["state"], "CLOSED");
        assert_eq!(json["bulkheads"][0]["in_flight"], 0);
    }
}
