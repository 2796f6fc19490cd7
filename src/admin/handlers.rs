use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BulkheadSnapshot, CircuitBreakerSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub open_circuits: usize,
}

#[derive(Serialize)]
pub struct Dependencies {
    pub circuit_breakers: Vec<CircuitBreakerSnapshot>,
    pub bulkheads: Vec<BulkheadSnapshot>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let open_circuits = state
        .gate
        .registry()
        .breaker_snapshots()
        .iter()
        .filter(|b| b.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        open_circuits,
    })
}

pub async fn get_dependencies(State(state): State<AppState>) -> Json<Dependencies> {
    let registry = state.gate.registry();
    Json(Dependencies {
        circuit_breakers: registry.breaker_snapshots(),
        bulkheads: registry.bulkhead_snapshots(),
    })
}
