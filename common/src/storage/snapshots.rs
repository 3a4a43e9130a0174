//! Snapshot cache keyed by `(channel type, identifier)`.
//!
//! Each channel type is published as a generation of objects:
//!
//! ```text
//! {prefix}/{type}/current                      -> active generation id
//! {prefix}/{type}/{generation}/{IDENTIFIER}.json
//! ```
//!
//! `put_all` writes a complete new generation before it moves the `current`
//! pointer, so readers either see the previous dataset or the new one.

use crate::channel::{ChannelSnapshot, ChannelType, normalize_identifier};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const CURRENT_POINTER: &str = "current";
const PUT_CONCURRENCY: usize = 16;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `Ok(None)` when no snapshot exists for the key.
    async fn get(
        &self,
        channel_type: ChannelType,
        identifier: &str,
    ) -> Result<Option<ChannelSnapshot>>;

    /// Replaces every snapshot of `channel_type` with `snapshots` and returns
    /// the number of distinct channels written.
    async fn put_all(
        &self,
        channel_type: ChannelType,
        snapshots: &[ChannelSnapshot],
    ) -> Result<usize>;

    /// Verifies that the backing store is reachable.
    async fn check_available(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct ObjectSnapshotStore {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl ObjectSnapshotStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: Path::from(prefix),
        }
    }

    /// Writes an auxiliary document (for example a build manifest) under the cache prefix.
    pub async fn put_document(&self, name: &str, body: Bytes) -> Result<()> {
        let path = self.prefix.child(name);
        self.store.put(&path, PutPayload::from(body)).await?;
        Ok(())
    }

    pub async fn get_document(&self, name: &str) -> Result<Option<Bytes>> {
        self.read(&self.prefix.child(name)).await
    }

    fn type_root(&self, channel_type: ChannelType) -> Path {
        self.prefix.child(channel_type.external_segment())
    }

    fn pointer_path(&self, channel_type: ChannelType) -> Path {
        self.type_root(channel_type).child(CURRENT_POINTER)
    }

    fn snapshot_path(&self, channel_type: ChannelType, generation: &str, identifier: &str) -> Path {
        self.type_root(channel_type)
            .child(generation)
            .child(format!("{}.json", identifier))
    }

    async fn read(&self, path: &Path) -> Result<Option<Bytes>> {
        match self.store.get(path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn current_generation(&self, channel_type: ChannelType) -> Result<Option<String>> {
        let Some(bytes) = self.read(&self.pointer_path(channel_type)).await? else {
            return Ok(None);
        };

        let generation = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::StoreUnavailable(format!("Corrupt generation pointer: {}", e)))?;
        let generation = generation.trim();

        if generation.is_empty() {
            return Err(Error::StoreUnavailable(format!(
                "Empty generation pointer for {}",
                channel_type
            )));
        }

        Ok(Some(generation.to_string()))
    }

    async fn read_snapshot(
        &self,
        channel_type: ChannelType,
        generation: &str,
        identifier: &str,
    ) -> Result<Option<ChannelSnapshot>> {
        let path = self.snapshot_path(channel_type, generation, identifier);
        let Some(bytes) = self.read(&path).await? else {
            return Ok(None);
        };

        let snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            Error::StoreUnavailable(format!("Corrupt snapshot at {}: {}", path, e))
        })?;

        Ok(Some(snapshot))
    }

    /// Reads `identifier` from an already resolved generation. A concurrent
    /// `put_all` may have swapped the pointer and deleted that generation in
    /// between, so a miss is retried once against the new pointer.
    async fn get_from_generation(
        &self,
        channel_type: ChannelType,
        identifier: &str,
        generation: String,
    ) -> Result<Option<ChannelSnapshot>> {
        let identifier = normalize_identifier(identifier);
        if let Some(snapshot) = self.read_snapshot(channel_type, &generation, &identifier).await? {
            return Ok(Some(snapshot));
        }

        match self.current_generation(channel_type).await? {
            Some(current) if current != generation => {
                debug!(%channel_type, stale = %generation, %current, "Generation swapped during read");
                self.read_snapshot(channel_type, &current, &identifier).await
            }
            _ => Ok(None),
        }
    }

    async fn delete_generation(&self, channel_type: ChannelType, generation: &str) -> Result<usize> {
        let root = self.type_root(channel_type).child(generation);
        let locations: Vec<Path> = self
            .store
            .list(Some(&root))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;

        for location in &locations {
            self.store.delete(location).await?;
        }

        Ok(locations.len())
    }
}

fn new_generation() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        Uuid::new_v4().simple()
    )
}

#[async_trait]
impl SnapshotStore for ObjectSnapshotStore {
    async fn get(
        &self,
        channel_type: ChannelType,
        identifier: &str,
    ) -> Result<Option<ChannelSnapshot>> {
        let Some(generation) = self.current_generation(channel_type).await? else {
            debug!(%channel_type, "No published generation");
            return Ok(None);
        };

        self.get_from_generation(channel_type, identifier, generation)
            .await
    }

    async fn put_all(
        &self,
        channel_type: ChannelType,
        snapshots: &[ChannelSnapshot],
    ) -> Result<usize> {
        // Last snapshot wins when an identifier repeats within the batch.
        let mut unique: BTreeMap<String, &ChannelSnapshot> = BTreeMap::new();
        for snapshot in snapshots {
            if snapshot.channel_type != channel_type {
                return Err(Error::InvalidInput(format!(
                    "Snapshot {} is a {}, not a {}",
                    snapshot.identifier, snapshot.channel_type, channel_type
                )));
            }
            unique.insert(normalize_identifier(&snapshot.identifier), snapshot);
        }

        let previous = self.current_generation(channel_type).await?;
        let generation = new_generation();

        stream::iter(unique.iter().map(Ok::<_, Error>))
            .try_for_each_concurrent(PUT_CONCURRENCY, |(identifier, snapshot)| {
                let path = self.snapshot_path(channel_type, &generation, identifier);
                async move {
                    let body = serde_json::to_vec(snapshot)?;
                    self.store.put(&path, PutPayload::from(body)).await?;
                    Ok(())
                }
            })
            .await?;

        self.store
            .put(
                &self.pointer_path(channel_type),
                PutPayload::from(generation.clone().into_bytes()),
            )
            .await?;

        debug!(%channel_type, %generation, count = unique.len(), "Published generation");

        if let Some(previous) = previous.filter(|previous| *previous != generation) {
            if let Err(e) = self.delete_generation(channel_type, &previous).await {
                warn!(%channel_type, generation = %previous, error = %e, "Failed to delete superseded generation");
            }
        }

        Ok(unique.len())
    }

    async fn check_available(&self) -> Result<()> {
        self.store.list_with_delimiter(Some(&self.prefix)).await?;
        Ok(())
    }
}
