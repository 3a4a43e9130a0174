//! HTTP facade over the publication-channel registry with a snapshot cache
//! to fall back on when the registry fails.

pub mod api;
pub mod gateway;
pub mod services;

use api::AppState;
use common::Result;
use common::config::Settings;
use common::storage::{SnapshotStore, build_snapshot_store};
use gateway::HttpRegistryGateway;
use services::{ResolutionEngine, UriRewriter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wires the registry gateway, snapshot cache and resolution engine together
/// and serves the API until Ctrl-C.
pub async fn run_facade(settings: &Settings) -> Result<()> {
    let registry = settings.registry()?;
    let facade = settings.facade()?;

    let cache: Arc<dyn SnapshotStore> = Arc::new(build_snapshot_store(&settings.cache)?);
    let gateway = Arc::new(HttpRegistryGateway::new(registry)?);
    let uris = UriRewriter::new(facade.base_url.clone())?;
    let engine = ResolutionEngine::new(gateway, Arc::clone(&cache), settings.resolution.mode, uris);

    let shutdown = CancellationToken::new();
    let state = AppState {
        engine: Arc::new(engine),
        cache,
        request_timeout: Duration::from_millis(facade.request_timeout_ms),
        shutdown: shutdown.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], facade.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, mode = ?settings.resolution.mode, registry = %registry.base_url, "Channel facade listening");

    axum::serve(listener, api::routes(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Channel facade stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
    // In-flight lookups observe this and stop waiting on the registry.
    shutdown.cancel();
}
