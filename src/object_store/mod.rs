mod s3;

pub use s3::{S3BucketConfig, S3ObjectStore};

use async_trait::async_trait;
use std::path::Path;

use crate::error::StorageError;

/// One object to upload as part of a batch, alongside the content type to send.
pub struct UploadItem<'a> {
    pub local_path: &'a Path,
    pub object_key: String,
    pub content_type: &'a str,
}

/// Capability set the worker pools need from a storage backend. Both the
/// S3-compatible implementation and a filesystem-backed test double satisfy
/// this trait identically.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, local_path: &Path, object_key: &str, content_type: &str) -> Result<String, StorageError>;

    async fn upload_many(&self, items: &[UploadItem<'_>]) -> Result<(), StorageError> {
        for item in items {
            self.upload(item.local_path, &item.object_key, item.content_type).await?;
        }
        Ok(())
    }

    async fn download(&self, object_key: &str, local_path: &Path) -> Result<(), StorageError>;
}
