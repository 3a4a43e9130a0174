use crate::extract::{BuildOutput, CacheBuilder};
use crate::utils::retry::retry_with_backoff;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::channel::ChannelType;
use common::config::EtlConfig;
use common::storage::{ObjectSnapshotStore, SnapshotStore};
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::info;

pub const MANIFEST_DOCUMENT: &str = "manifest.json";

/// Summary of a cache build, stored next to the snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub generated_at: DateTime<Utc>,
    pub extract_sha256: String,
    pub total_rows: usize,
    pub rejected_rows: usize,
    pub published: BTreeMap<ChannelType, usize>,
}

pub fn extract_checksum(extract_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(extract_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Builds snapshots from an extract and publishes them into the snapshot cache.
pub struct CachePublisher {
    store: ObjectSnapshotStore,
    max_rejected_ratio: f64,
    retries: u32,
    base_delay_ms: u64,
}

impl CachePublisher {
    pub fn new(store: ObjectSnapshotStore, config: &EtlConfig) -> Self {
        Self {
            store,
            max_rejected_ratio: config.max_rejected_ratio,
            retries: config.retries,
            base_delay_ms: config.base_delay_ms,
        }
    }

    pub async fn run(&self, extract_text: &str) -> Result<BuildManifest> {
        let extract_sha256 = extract_checksum(extract_text);
        let output = CacheBuilder::new().build(extract_text);

        if output.rejected_ratio() > self.max_rejected_ratio {
            return Err(Error::InvalidInput(format!(
                "{} of {} extract rows rejected, above the allowed ratio {}; nothing published",
                output.rejected.len(),
                output.total_rows(),
                self.max_rejected_ratio
            )));
        }

        let published = self.publish(&output).await?;

        let manifest = BuildManifest {
            generated_at: Utc::now(),
            extract_sha256,
            total_rows: output.total_rows(),
            rejected_rows: output.rejected.len(),
            published,
        };

        let body = Bytes::from(serde_json::to_vec_pretty(&manifest)?);
        retry_with_backoff(self.retries, self.base_delay_ms, || {
            self.store.put_document(MANIFEST_DOCUMENT, body.clone())
        })
        .await?;

        info!(
            sha256 = %manifest.extract_sha256,
            total = manifest.total_rows,
            rejected = manifest.rejected_rows,
            "Wrote build manifest"
        );

        Ok(manifest)
    }

    /// Replaces the cached dataset of every channel type present in the extract.
    async fn publish(&self, output: &BuildOutput) -> Result<BTreeMap<ChannelType, usize>> {
        let mut published = BTreeMap::new();

        for (channel_type, snapshots) in output.by_type() {
            let written = retry_with_backoff(self.retries, self.base_delay_ms, || {
                self.store.put_all(channel_type, &snapshots)
            })
            .await?;

            info!(%channel_type, written, "Published channel snapshots");
            published.insert(channel_type, written);
        }

        Ok(published)
    }
}
