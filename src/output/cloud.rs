//! Object storage destination (S3, GCS, Azure, local filesystem, in-memory)

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single storage call
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Split `bucket/some/prefix/` into `("bucket", "some/prefix")`
fn split_bucket(without_scheme: &str) -> (&str, String) {
    match without_scheme.find('/') {
        Some(idx) => (
            &without_scheme[..idx],
            without_scheme[idx + 1..].trim_end_matches('/').to_string(),
        ),
        None => (without_scheme, String::new()),
    }
}

/// Storage destination parsed from URL
///
/// Keys passed to `put`/`get`/`list` are relative to the destination prefix.
#[derive(Debug, Clone)]
pub struct CloudDestination {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// Original URL scheme for logging
    scheme: String,
    /// Bound applied to every storage call
    timeout: Duration,
}

impl CloudDestination {
    /// Parse a destination URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3 (or S3-compatible via `AWS_ENDPOINT`)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `memory://` - process-local store
    /// - `/local/path/` or `file:///local/path/` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, prefix) = split_bucket(rest);
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "s3"))
        } else if let Some(rest) = url.strip_prefix("gs://") {
            let (bucket, prefix) = split_bucket(rest);
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "gs"))
        } else if let Some(rest) = url.strip_prefix("az://") {
            let (container, prefix) = split_bucket(rest);
            let store = MicrosoftAzureBuilder::from_env()
                .with_container_name(container)
                .build()
                .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "az"))
        } else if url.starts_with("memory://") {
            Ok(Self::in_memory())
        } else {
            Self::parse_local(url)
        }
    }

    /// Parse local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self::from_store(Arc::new(store), String::new(), "file"))
    }

    /// Wrap an existing object store
    pub fn from_store(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            scheme: scheme.into(),
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    /// Process-local store, used by tests and dry runs
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), String::new(), "memory")
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if this is a cloud destination (not local)
    pub fn is_cloud(&self) -> bool {
        !matches!(self.scheme.as_str(), "file" | "memory")
    }

    /// Get the scheme (s3, gs, az, file, memory)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Absolute object path for a relative key
    fn object_path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{key}", self.prefix))
        }
    }

    /// Display URL for a relative key
    pub fn display_path(&self, key: &str) -> String {
        format!("{}://{}", self.scheme, self.object_path(key))
    }

    async fn bounded<T, F>(&self, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::StorageTimeout {
                path: self.display_path(key),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Write bytes under a key, replacing any existing object
    pub async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.object_path(key);
        self.bounded(key, async {
            self.store
                .put(&path, data.into())
                .await
                .map_err(|e| Error::storage(format!("Failed to write {path}: {e}")))
        })
        .await?;
        Ok(self.display_path(key))
    }

    /// Read an object, `None` if it does not exist
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.object_path(key);
        self.bounded(key, async {
            match self.store.get(&path).await {
                Ok(result) => result
                    .bytes()
                    .await
                    .map(Some)
                    .map_err(|e| Error::storage(format!("Failed to read {path}: {e}"))),
                Err(object_store::Error::NotFound { .. }) => Ok(None),
                Err(e) => Err(Error::storage(format!("Failed to read {path}: {e}"))),
            }
        })
        .await
    }

    /// Remove an object; a missing object is not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        self.bounded(key, async {
            match self.store.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Error::storage(format!("Failed to delete {path}: {e}"))),
            }
        })
        .await
    }

    /// Whether an object exists under the key
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key);
        self.bounded(key, async {
            match self.store.head(&path).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Error::storage(format!("Failed to stat {path}: {e}"))),
            }
        })
        .await
    }

    /// List every key below a prefix, relative to the destination, sorted
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.object_path(prefix.trim_end_matches('/'));
        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };

        let metas: Vec<object_store::ObjectMeta> = self
            .bounded(prefix, async {
                self.store
                    .list(Some(&path))
                    .try_collect()
                    .await
                    .map_err(|e| Error::storage(format!("Failed to list {path}: {e}")))
            })
            .await?;

        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|meta| {
                let location = meta.location.to_string();
                location
                    .strip_prefix(&strip)
                    .map(str::to_string)
                    .unwrap_or(location)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}
