use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::TryStreamExt;
use tracing::debug;

use super::ObjectStore;
use crate::error::StorageError;

/// Bucket routing by object-key prefix, matching the layout in `SPEC_FULL.md`:
/// `uploads/` holds source videos, everything else (`transcoded/`, `hls/`) is
/// written to the transcode output bucket.
#[derive(Debug, Clone)]
pub struct S3BucketConfig {
    pub uploads_bucket: String,
    pub transcode_bucket: String,
}

impl S3BucketConfig {
    fn bucket_for(&self, object_key: &str) -> &str {
        if object_key.starts_with("uploads/") {
            &self.uploads_bucket
        } else {
            &self.transcode_bucket
        }
    }
}

pub struct S3ObjectStore {
    client: Client,
    buckets: S3BucketConfig,
}

impl S3ObjectStore {
    pub fn new(client: Client, buckets: S3BucketConfig) -> Self {
        Self { client, buckets }
    }

    /// Build a client from the ambient AWS config, optionally pointed at a
    /// MinIO-style custom endpoint for local development.
    pub async fn from_env(region: &str, endpoint_url: Option<&str>, buckets: S3BucketConfig) -> Self {
        let shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config).region(Region::new(region.to_string()));
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Self::new(client, buckets)
    }

    fn map_sdk_error<E: std::fmt::Display>(context: &str, err: E) -> StorageError {
        StorageError::Network(format!("{context}: {err}"))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, local_path: &Path, object_key: &str, content_type: &str) -> Result<String, StorageError> {
        let bucket = self.buckets.bucket_for(object_key);
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| Self::map_sdk_error("reading local file", e))?;

        debug!(bucket, object_key, "uploading object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(object_key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("put_object", e))?;

        Ok(object_key.to_string())
    }

    async fn download(&self, object_key: &str, local_path: &Path) -> Result<(), StorageError> {
        let bucket = self.buckets.bucket_for(object_key);

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("get_object", e))?;

        let mut file = tokio::fs::File::create(local_path).await?;
        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|e| Self::map_sdk_error("streaming body", e))?
        {
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_routing_by_prefix() {
        let buckets = S3BucketConfig {
            uploads_bucket: "uploads".to_string(),
            transcode_bucket: "transcode".to_string(),
        };
        assert_eq!(buckets.bucket_for("uploads/u1/v1.mov"), "uploads");
        assert_eq!(buckets.bucket_for("transcoded/u1/v1_720p_2000k.mp4"), "transcode");
        assert_eq!(buckets.bucket_for("hls/u1/v1/job/master.m3u8"), "transcode");
    }
}
