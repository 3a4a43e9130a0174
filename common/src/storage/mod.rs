pub mod snapshots;

pub use snapshots::{ObjectSnapshotStore, SnapshotStore};

use crate::config::{CacheBackend, CacheConfig};
use crate::{Error, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use std::sync::Arc;

/// Builds the object store backing the snapshot cache.
pub fn build_object_store(config: &CacheConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemory::new())),
        CacheBackend::S3 => {
            let s3_config = config.s3.as_ref().ok_or_else(|| {
                Error::InvalidInput("cache.s3 is required for the s3 cache backend".to_string())
            })?;

            let s3 = AmazonS3Builder::new()
                .with_bucket_name(&s3_config.bucket)
                .with_region(&s3_config.region)
                .with_access_key_id(&s3_config.access_key)
                .with_secret_access_key(&s3_config.secret_key)
                .with_endpoint(&s3_config.endpoint)
                .with_allow_http(s3_config.allow_http)
                .build()?;

            Ok(Arc::new(s3))
        }
    }
}

/// Builds the snapshot cache described by `config`.
pub fn build_snapshot_store(config: &CacheConfig) -> Result<ObjectSnapshotStore> {
    let store = build_object_store(config)?;
    Ok(ObjectSnapshotStore::new(store, &config.prefix))
}
