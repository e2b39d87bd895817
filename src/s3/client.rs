use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ObjectStorage;
use crate::config::StorageConfig;
use crate::error::StorageError;

const FALLBACK_REGION: &str = "us-east-1";

/// Wrapper around AWS S3 client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    region: String,
}

impl S3Client {
    /// Create a client from the default AWS configuration chain plus any
    /// endpoint/region overrides
    pub async fn new(config: &StorageConfig) -> Self {
        let base_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let region = config
            .region
            .clone()
            .or_else(|| base_config.region().map(|r| r.as_ref().to_string()))
            .unwrap_or_else(|| FALLBACK_REGION.to_string());

        // Build S3-specific config
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&base_config)
            .region(aws_sdk_s3::config::Region::new(region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());
        S3Client { client, region }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::transfer(bucket, key, err)
                }
            })?;

        let io_err = |source| StorageError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;

        // Stream straight to disk; archives can be far larger than the function's memory
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| StorageError::transfer(bucket, key, err))?
        {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        debug!(bucket, key, bytes = written, "downloaded object");
        Ok(written)
    }

    async fn upload(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::transfer(bucket, key, err))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::transfer(bucket, key, err))?;

        Ok(())
    }
}
