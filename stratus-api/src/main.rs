//! Stratus API Server Entry Point
//!
//! Loads configuration, builds the application state, spawns the outbox
//! relay and serves HTTP until Ctrl-C. On shutdown the relay finishes its
//! current cycle before the process exits.

use std::sync::Arc;

use stratus_api::telemetry::{init_tracing, TelemetryConfig};
use stratus_api::{
    build_app_state, create_api_router, outbox_relay_task, ApiError, ApiResult, AppConfig,
};
use stratus_core::SystemClock;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = AppConfig::from_env()?;
    let state = build_app_state(&config, Arc::new(SystemClock)).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = tokio::spawn(outbox_relay_task(Arc::clone(&state.relay), shutdown_rx));

    let app = create_api_router(&state);
    let addr = config.api.bind_addr()?;
    tracing::info!(%addr, store = ?config.api.store, "Starting Stratus API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    let _ = shutdown_tx.send(true);
    if let Err(e) = relay.await {
        tracing::error!(error = %e, "Outbox relay task failed");
    }

    served
}
