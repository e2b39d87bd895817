//! S3 object-created notifications and the archive they point at.

use serde::Deserialize;
use tracing::warn;

use crate::error::ExtractError;

/// The subset of an S3 event notification we read.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl S3Event {
    /// Parse a raw invocation payload.
    pub fn from_value(payload: serde_json::Value) -> Result<Self, ExtractError> {
        serde_json::from_value(payload).map_err(|e| ExtractError::InvalidEvent(e.to_string()))
    }

    /// Resolve the archive named by the first record.
    ///
    /// Only record 0 is consumed. S3 delivers one record per notification in
    /// practice; anything beyond that is logged and dropped.
    pub fn archive_ref(&self) -> Result<ArchiveRef, ExtractError> {
        let record = self
            .records
            .first()
            .ok_or_else(|| ExtractError::InvalidEvent("event has no records".to_string()))?;

        if self.records.len() > 1 {
            warn!(
                ignored = self.records.len() - 1,
                "event carries more than one record, only the first is processed"
            );
        }

        let bucket = record.s3.bucket.name.trim();
        if bucket.is_empty() {
            return Err(ExtractError::InvalidEvent("record has an empty bucket name".to_string()));
        }

        let key = decode_key(&record.s3.object.key)?;
        if key.is_empty() {
            return Err(ExtractError::InvalidEvent("record has an empty object key".to_string()));
        }

        Ok(ArchiveRef::new(bucket, key))
    }
}

/// Object keys in S3 notifications are form-encoded: spaces arrive as `+`.
fn decode_key(raw: &str) -> Result<String, ExtractError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| ExtractError::InvalidEvent(format!("object key {raw:?} is not valid UTF-8: {e}")))
}

/// Identifies the archive object an extraction run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    pub bucket: String,
    pub key: String,
}

impl ArchiveRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ArchiveRef {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Directory component of the key, without a trailing slash.
    pub fn prefix(&self) -> &str {
        match self.key.rfind('/') {
            Some(pos) => &self.key[..pos],
            None => "",
        }
    }

    /// Key an archive entry is uploaded under: the entry name joined onto
    /// the archive's prefix.
    pub fn entry_key(&self, entry_name: &str) -> String {
        let mut name = entry_name;
        loop {
            if let Some(rest) = name.strip_prefix("./") {
                name = rest;
            } else if let Some(rest) = name.strip_prefix('/') {
                name = rest;
            } else {
                break;
            }
        }

        let prefix = self.prefix();
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }
}
