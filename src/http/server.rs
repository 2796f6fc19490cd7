//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the demonstration endpoints
//! - Wire up middleware (request ID, tracing, timeout, metrics)
//! - Route each protected endpoint through the resilience gate
//! - Apply configuration updates while serving
//! - Bind server to listener and shut down gracefully

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::http::downstream::DownstreamClient;
use crate::http::request::{propagate_request_id, RequestId, X_REQUEST_ID};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::resilience::fallback::fixed;
use crate::resilience::{BoxError, ResilienceGate};

pub const WORKING_API_RESPONSE: &str = "working-API";
pub const FALLBACK_RESPONSE: &str = "fallback-response";

/// Breaker guarding `/working-api`.
pub const WORKING_API_BREAKER: &str = "default";
/// Bulkhead guarding `/working-api`.
pub const WORKING_API_BULKHEAD: &str = "working-api";
/// Breaker and bulkhead guarding `/sample-api`.
pub const SAMPLE_API_DEPENDENCY: &str = "sample-api";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: ResilienceGate,
    pub downstream: DownstreamClient,
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig, gate: ResilienceGate) -> Self {
        Self {
            gate,
            downstream: DownstreamClient::new(),
            config: Arc::new(ArcSwap::from_pointee(config)),
            started_at: Instant::now(),
        }
    }

    /// Swap in a new configuration and reconfigure the resilience registry.
    pub fn apply_config(&self, config: GatewayConfig) {
        let replaced = self.gate.registry().reload(config.resilience.clone());
        self.config.store(Arc::new(config));
        tracing::info!(replaced, "Configuration applied");
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    state: AppState,
    router: Router,
}

impl GatewayServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, gate: ResilienceGate) -> Self {
        let request_timeout = Duration::from_secs(config.listener.request_timeout_secs);
        let state = AppState::new(config, gate);
        let router = Self::build_router(state.clone(), request_timeout);
        Self { state, router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/working-api", get(working_api))
            .route("/sample-api", get(sample_api))
            .route("/health", get(health))
            .with_state(state)
            .layer(middleware::from_fn(record_metrics))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(middleware::from_fn(propagate_request_id))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The public router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The admin router, served on its own listener.
    pub fn admin_router(&self) -> Router {
        setup_admin_router(self.state.clone())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configuration updates received on `config_updates` are applied while
    /// serving. Returns once `shutdown` fires and in-flight requests drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let state = self.state.clone();
        let updates = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                state.apply_config(config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        updates.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Always-healthy endpoint guarded by the `default` breaker.
async fn working_api(State(state): State<AppState>) -> Result<String, GatewayError> {
    let timeout = state.config.load().downstream.call_timeout();
    let value = state
        .gate
        .call_site(WORKING_API_BREAKER, WORKING_API_BULKHEAD)
        .call(
            || async { Ok::<_, BoxError>(WORKING_API_RESPONSE.to_string()) },
            fixed(FALLBACK_RESPONSE.to_string()),
            timeout,
        )
        .await?;
    Ok(value)
}

/// Calls the configured downstream URL; falls back when it misbehaves.
async fn sample_api(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<String, GatewayError> {
    let (url, timeout) = {
        let config = state.config.load();
        (
            config.downstream.sample_api_url.clone(),
            config.downstream.call_timeout(),
        )
    };

    tracing::debug!(url = %url, "Calling sample API");
    let value = state
        .gate
        .protected_call(
            SAMPLE_API_DEPENDENCY,
            || state.downstream.get_text(&url, request_id.as_str()),
            fixed(FALLBACK_RESPONSE.to_string()),
            timeout,
        )
        .await?;
    Ok(value)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await.into_response();
    metrics::record_request(&endpoint, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;
    use crate::config::schema::CircuitBreakerOverrides;
    use crate::resilience::{CircuitState, NoopObserver, ResilienceRegistry};

    fn server(config: GatewayConfig) -> GatewayServer {
        let registry = ResilienceRegistry::new(config.resilience.clone(), Arc::new(NoopObserver));
        GatewayServer::new(config, ResilienceGate::new(Arc::new(registry)))
    }

    async fn get(router: Router, path: &str) -> (StatusCode, String, Option<String>) {
        let response = router
            .oneshot(HttpRequest::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get(&X_REQUEST_ID)
            .map(|v| v.to_str().unwrap().to_owned());
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), request_id)
    }

    #[tokio::test]
    async fn test_working_api() {
        let server = server(GatewayConfig::default());
        let (status, body, request_id) = get(server.router(), "/working-api").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, WORKING_API_RESPONSE);
        assert!(request_id.is_some());

        let breakers = server.state().gate.registry().breaker_snapshots();
        assert_eq!(breakers[0].name, WORKING_API_BREAKER);
    }

    #[tokio::test]
    async fn test_sample_api_falls_back_when_unreachable() {
        let mut config = GatewayConfig::default();
        // Nothing listens on port 1.
        config.downstream.sample_api_url = "http://127.0.0.1:1/some-sample-url".into();
        config.resilience.circuit_breakers.insert(
            SAMPLE_API_DEPENDENCY.into(),
            CircuitBreakerOverrides {
                sliding_window_size: Some(2),
                minimum_samples: Some(2),
                ..Default::default()
            },
        );
        let server = server(config);

        for _ in 0..3 {
            let (status, body, _) = get(server.router(), "/sample-api").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, FALLBACK_RESPONSE);
        }
        let breaker = server.state().gate.registry().circuit_breaker(SAMPLE_API_DEPENDENCY);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed() {
        let server = server(GatewayConfig::default());
        let response = server
            .router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_apply_config_reconfigures_registry() {
        let server = server(GatewayConfig::default());
        let before = server.state().gate.registry().circuit_breaker(SAMPLE_API_DEPENDENCY);

        let mut next = GatewayConfig::default();
        next.downstream.sample_api_url = "http://127.0.0.1:9/other".into();
        next.resilience.circuit_breakers.insert(
            SAMPLE_API_DEPENDENCY.into(),
            CircuitBreakerOverrides {
                failure_rate_threshold: Some(75.0),
                ..Default::default()
            },
        );
        server.state().apply_config(next);

        let after = server.state().gate.registry().circuit_breaker(SAMPLE_API_DEPENDENCY);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.config().failure_rate_threshold, 75.0);
        assert_eq!(
            server.state().config.load().downstream.sample_api_url,
            "http://127.0.0.1:9/other"
        );
    }
}
