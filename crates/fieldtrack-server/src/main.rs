//! # fieldtrack-server
//!
//! HTTP server for fieldtrack location and geofence monitoring.
//!
//! This binary provides:
//! - REST API for permissions, positions, targets, monitoring and configuration
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, host-fed positions
//! cargo run --package fieldtrack-server
//!
//! # Against a local gpsd
//! FIELDTRACK__SOURCE__KIND=gpsd ./fieldtrack-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use fieldtrack_core::AppConfig;
use fieldtrack_server::{api, logging, state::AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    logging::init(config.server.production)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting fieldtrack-server");

    let state = AppState::from_config(&config)?;

    if config.server.auto_start {
        // Startup continues without monitoring; it can be started over the API.
        if let Err(e) = state.monitor.start_monitoring().await {
            warn!(error = %e, "Could not start monitoring at startup");
        }
    }

    let app = api::create_router(state.clone());

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("invalid server.bind_address")?;
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.monitor.stop_monitoring();
    info!("fieldtrack-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
