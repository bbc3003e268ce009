//! # fencetag-server
//!
//! HTTP host for fencetag.
//!
//! This binary provides:
//! - REST API for delivering location events and inspecting tags
//! - Location service lifecycle control
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package fencetag-server
//!
//! # Custom config file, overriding one value from the environment
//! FENCETAG_CONFIG=./fencetag.toml FENCETAG__EXPIRY__DELAY_MS=5000 ./fencetag-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fencetag_core::{default_config_path, FencetagConfig, FileTagStore};
use fencetag_server::{api, logging, state::AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "FENCETAG_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(default_config_path, PathBuf::from);
    let config = FencetagConfig::load_layered(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    logging::init(config.server.production)?;

    info!(
        config = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting fencetag-server"
    );

    let store = match &config.storage.data_dir {
        Some(dir) => FileTagStore::new(dir),
        None => FileTagStore::in_default_location()?,
    };
    info!(
        path = %store.path().display(),
        updated_at = ?store.updated_at()?,
        "Using tag store"
    );

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_address))?;
    let auto_start = config.server.auto_start && config.credentials.is_some();

    let state = AppState::new(config, Arc::new(store)).shared();

    if auto_start {
        if let Err(error) = state.start_location_service() {
            warn!(%error, "Location service did not start; use POST /api/service/start to retry");
        }
    }

    let app = api::create_router(Arc::clone(&state));
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.bridge.stop();
    info!("fencetag-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
