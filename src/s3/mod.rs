pub mod client;
pub mod memory;
pub mod metrics;

pub use client::S3Client;
pub use memory::MemoryStorage;
pub use metrics::TransferMetrics;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::StorageError;

/// Object storage operations an extraction run needs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download a whole object into `dest`, returning the number of bytes written.
    ///
    /// A missing object must be reported as [`StorageError::NotFound`].
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StorageError>;

    /// Store `body` as a new object, replacing any existing one.
    async fn upload(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StorageError>;

    /// Delete an object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
