//! In-process object storage.
//!
//! Backs the extractor in tests and local dry runs. Failures can be injected
//! per key so partial-failure behaviour can be exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::ObjectStorage;
use crate::error::StorageError;

type ObjectKey = (String, String);

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectKey, Bytes>,
    failing_uploads: HashSet<ObjectKey>,
    failing_deletes: HashSet<ObjectKey>,
    delete_attempts: Vec<ObjectKey>,
    upload_delay: Option<Duration>,
}

/// Thread-safe in-memory bucket store. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

fn object_key(bucket: &str, key: &str) -> ObjectKey {
    (bucket.to_string(), key.to_string())
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.objects.insert(object_key(bucket, key), body.into());
        }
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.read().ok()?;
        inner.objects.get(&object_key(bucket, key)).cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.get(bucket, key).is_some()
    }

    /// All keys stored in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = inner
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Make every upload to `bucket/key` fail
    pub fn fail_upload(&self, bucket: &str, key: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_uploads.insert(object_key(bucket, key));
        }
    }

    /// Make every delete of `bucket/key` fail
    pub fn fail_delete(&self, bucket: &str, key: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_deletes.insert(object_key(bucket, key));
        }
    }

    /// Sleep this long inside every upload, to force workers to overlap
    pub fn set_upload_delay(&self, delay: Duration) {
        if let Ok(mut inner) = self.inner.write() {
            inner.upload_delay = Some(delay);
        }
    }

    /// Every delete call made so far, successful or not, as `(bucket, key)`
    pub fn delete_attempts(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .map(|inner| inner.delete_attempts.clone())
            .unwrap_or_default()
    }

    fn poisoned(bucket: &str, key: &str) -> StorageError {
        StorageError::transfer(bucket, key, "memory storage lock poisoned")
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StorageError> {
        let body = {
            let inner = self.inner.read().map_err(|_| Self::poisoned(bucket, key))?;
            inner
                .objects
                .get(&object_key(bucket, key))
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
        };

        tokio::fs::write(dest, &body)
            .await
            .map_err(|source| StorageError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        Ok(body.len() as u64)
    }

    async fn upload(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StorageError> {
        let delay = {
            let inner = self.inner.read().map_err(|_| Self::poisoned(bucket, key))?;
            if inner.failing_uploads.contains(&object_key(bucket, key)) {
                return Err(StorageError::transfer(bucket, key, "injected upload failure"));
            }
            inner.upload_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write().map_err(|_| Self::poisoned(bucket, key))?;
        inner.objects.insert(object_key(bucket, key), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned(bucket, key))?;
        let target = object_key(bucket, key);
        inner.delete_attempts.push(target.clone());

        if inner.failing_deletes.contains(&target) {
            return Err(StorageError::transfer(bucket, key, "injected delete failure"));
        }

        inner.objects.remove(&target);
        Ok(())
    }
}
