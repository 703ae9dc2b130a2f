use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use serde::{Deserialize, Serialize};

use crate::config::ObjectStorageConfig;

/// Where a stored artifact can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum ArtifactRef {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRef::Url(url) => f.write_str(url),
            ArtifactRef::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

/// Durable storage for uploaded artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `data` under `key`, returning the raw reference to it.
    async fn put(&self, key: &str, data: &[u8], content_type: &str)
        -> Result<ArtifactRef, StorageError>;

    /// Issue a read-only reference to `key` valid for `expiry`.
    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StorageError>;

    fn backend(&self) -> &'static str;
}

/// Client for S3-compatible object storage (R2, MinIO, Azure gateways).
pub struct S3Storage {
    bucket: Box<Bucket>,
}

impl S3Storage {
    pub fn new(config: ObjectStorageConfig<'_>) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: config.endpoint.to_string(),
        };

        let credentials = Credentials::new(
            Some(config.access_key),
            Some(config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(config.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ArtifactStore for S3Storage {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ArtifactRef, StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::Rejected(code));
        }

        Ok(ArtifactRef::Url(format!("{}/{}", self.bucket.url(), key)))
    }

    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StorageError> {
        let expiry_secs = u32::try_from(expiry.as_secs()).unwrap_or(u32::MAX);
        let url = self.bucket.presign_get(key, expiry_secs, None).await?;
        Ok(url)
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}

/// Filesystem artifact store for single-node and offline deployments.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalStorage {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<ArtifactRef, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(ArtifactRef::File(path))
    }

    async fn signed_url(&self, _key: &str, _expiry: Duration) -> Result<String, StorageError> {
        Err(StorageError::Unsupported(
            "local filesystem storage cannot issue signed URLs",
        ))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage rejected the upload with status {0}")]
    Rejected(u16),

    #[error("Filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}
