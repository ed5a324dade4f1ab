// ============================================================================
// Manifest Storage
// ============================================================================
//
// Manifest files live in an object store bucket named by each notification.
// ManifestDownloader copies one object to the local download directory and
// checks the byte count against the size the notification announced; a
// short or long file is removed and reported as a transport failure.
//
// Bucket access goes through ObjectStoreFactory so tests and local runs can
// swap S3 for in-memory buckets.
//
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::Notification;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[async_trait]
pub trait ObjectStoreFactory: Send + Sync {
    /// Object store rooted at the given bucket
    async fn create_object_store(
        &self,
        bucket: &str,
    ) -> Result<Arc<dyn ObjectStore>, object_store::Error>;
}

/// S3 buckets, credentials and region taken from the standard AWS variables
#[derive(Debug, Default, Clone)]
pub struct S3ObjectStoreFactory;

#[async_trait]
impl ObjectStoreFactory for S3ObjectStoreFactory {
    async fn create_object_store(
        &self,
        bucket: &str,
    ) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Arc::new(store))
    }
}

/// In-memory buckets created on first use
#[derive(Debug, Default)]
pub struct InMemoryObjectStoreFactory {
    buckets: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl InMemoryObjectStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, name: &str) -> Arc<InMemory> {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()))
            .clone()
    }
}

#[async_trait]
impl ObjectStoreFactory for InMemoryObjectStoreFactory {
    async fn create_object_store(
        &self,
        bucket: &str,
    ) -> Result<Arc<dyn ObjectStore>, object_store::Error> {
        let store: Arc<dyn ObjectStore> = self.bucket(bucket);
        Ok(store)
    }
}

pub struct ManifestDownloader {
    factory: Arc<dyn ObjectStoreFactory>,
    download_dir: PathBuf,
}

impl ManifestDownloader {
    pub fn new(factory: Arc<dyn ObjectStoreFactory>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            download_dir: download_dir.into(),
        }
    }

    /// Copy the referenced object to a fresh local file and return its path
    pub async fn download(&self, notification: &Notification) -> ReprocessResult<PathBuf> {
        let start = Instant::now();
        let store = self
            .factory
            .create_object_store(&notification.source_bucket)
            .await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let local = self.local_path(&notification.source_key);

        info!(
            source = %notification,
            local = %local.display(),
            "Downloading manifest"
        );

        let written = match Self::copy_to(store.as_ref(), &notification.source_key, &local).await {
            Ok(written) => written,
            Err(e) => {
                remove_file(&local).await;
                return Err(e);
            }
        };

        if written != notification.object_size {
            remove_file(&local).await;
            return Err(ReprocessError::SizeMismatch {
                location: notification.to_string(),
                expected: notification.object_size,
                actual: written,
            });
        }

        info!(
            source = %notification,
            bytes = written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Download complete"
        );
        Ok(local)
    }

    async fn copy_to(store: &dyn ObjectStore, key: &str, local: &Path) -> ReprocessResult<u64> {
        let object = store.get(&ObjectPath::from(key)).await?;
        let mut chunks = object.into_stream();
        let mut file = tokio::fs::File::create(local).await?;
        let mut written = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }

    fn local_path(&self, key: &str) -> PathBuf {
        let base = key.rsplit('/').next().filter(|b| !b.is_empty()).unwrap_or("manifest");
        self.download_dir.join(format!("{}-{}", base, Uuid::new_v4()))
    }
}

/// Remove a downloaded file; failures are logged, never raised
pub async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Local file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove local file"),
    }
}
