//! Offline cache build: turns the registry's periodic bulk extract into the
//! snapshot cache the facade falls back to.

pub mod extract;
pub mod pipeline;
pub mod utils;

use common::config::{CacheBackend, Settings};
use common::storage::build_snapshot_store;
use common::{Error, Result};
use pipeline::{BuildManifest, CachePublisher};
use tracing::{info, warn};

/// Runs a complete cache build. `extract_override` takes precedence over
/// `etl.extract_path`.
pub async fn run_etl_pipeline(
    settings: &Settings,
    extract_override: Option<&str>,
) -> Result<BuildManifest> {
    let extract_path = extract_override
        .map(str::to_string)
        .or_else(|| settings.etl.extract_path.clone())
        .ok_or_else(|| Error::InvalidInput("No extract path configured".to_string()))?;

    if settings.cache.backend == CacheBackend::Memory {
        warn!("Cache backend is in-memory; published snapshots will not outlive this process");
    }

    info!(%extract_path, "Reading bulk extract");
    let extract_text = tokio::fs::read_to_string(&extract_path).await?;

    let store = build_snapshot_store(&settings.cache)?;
    CachePublisher::new(store, &settings.etl)
        .run(&extract_text)
        .await
}
