//! Resilience Gateway
//!
//! An HTTP gateway whose outbound calls pass through a resilience gate:
//! bulkhead admission, circuit breaker, deadline and fallback.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ handler ──▶ ResilienceGate
//!                                                   │
//!                                                   ├─ bulkhead (admit / reject)
//!                                                   ├─ circuit breaker (run / short-circuit)
//!                                                   ├─ deadline
//!                                                   └─ fallback ◀── any failure
//!                                                   │
//!                                                   ▼
//!                                             downstream service
//!
//!     Cross-cutting: config (+ hot reload), observability (logs, metrics),
//!     admin API, lifecycle (signals, graceful shutdown)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resilience_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use resilience_gateway::http::GatewayServer;
use resilience_gateway::lifecycle::{wait_for_signal, Shutdown};
use resilience_gateway::observability::{init_logging, init_metrics, LoggingObserver, MetricsObserver};
use resilience_gateway::resilience::{CompositeObserver, ResilienceGate, ResilienceRegistry};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "resilience-gateway")]
#[command(about = "HTTP gateway with circuit breakers, bulkheads and fallbacks", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("resilience-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        sample_api_url = %config.downstream.sample_api_url,
        breakers = config.resilience.circuit_breakers.len(),
        bulkheads = config.resilience.bulkheads.len(),
        "Configuration loaded"
    );

    let mut observer = CompositeObserver::new().with(Arc::new(LoggingObserver));
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => match init_metrics(addr) {
                Ok(()) => observer = observer.with(Arc::new(MetricsObserver)),
                Err(e) => tracing::error!(error = %e, "Metrics disabled"),
            },
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(ResilienceRegistry::new(
        config.resilience.clone(),
        Arc::new(observer),
    ));
    let gate = ResilienceGate::new(registry);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let admin_config = config.admin.clone();
    let server = GatewayServer::new(config, gate);
    let shutdown = Shutdown::new();

    // Hot reload: the watcher sends every valid new file to the server.
    let (_watcher, config_rx) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let mut tasks = Vec::new();
    if admin_config.enabled {
        let admin_listener = TcpListener::bind(&admin_config.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = server.admin_router();
        let mut admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await
        }));
    }

    let server_shutdown = shutdown.subscribe();
    tasks.push(tokio::spawn(server.run(listener, config_rx, server_shutdown)));

    let signal = wait_for_signal().await?;
    tracing::info!(signal = %signal, "Shutdown signal received");

    let drained = shutdown
        .drain(
            async move {
                for task in tasks {
                    match task.await {
                        Ok(Err(e)) => tracing::error!(error = %e, "Server exited with error"),
                        Err(e) => tracing::error!(error = %e, "Server task panicked"),
                        Ok(Ok(())) => {}
                    }
                }
            },
            SHUTDOWN_GRACE,
        )
        .await;

    if drained {
        tracing::info!("Shutdown complete");
    }
    Ok(())
}
