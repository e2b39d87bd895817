use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by an [`ObjectStorage`](crate::s3::ObjectStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("transfer failed for s3://{bucket}/{key}: {source}")]
    Transfer {
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("local I/O failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn transfer(bucket: &str, key: &str, source: impl Into<BoxError>) -> Self {
        StorageError::Transfer {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}

/// Errors that abort a whole extraction run.
///
/// None of these produce a report. The source archive is left in place so it
/// can be retried.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid trigger event: {0}")]
    InvalidEvent(String),

    #[error("source archive s3://{bucket}/{key} not found")]
    SourceMissing { bucket: String, key: String },

    #[error("failed to download source archive: {0}")]
    Download(#[source] StorageError),

    #[error("not a readable tar archive: {0}")]
    InvalidArchive(String),

    #[error("scratch space unavailable: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("extraction worker failed: {0}")]
    Worker(String),
}

impl From<StorageError> for ExtractError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { bucket, key } => ExtractError::SourceMissing { bucket, key },
            other => ExtractError::Download(other),
        }
    }
}

/// Errors local to a single archive entry. These are recorded in the report
/// and never abort the run.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry {0:?} is not in the archive index")]
    Unknown(String),

    #[error("entry {name:?} has no readable content: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("failed to read entry {name:?}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload entry {name:?}: {source}")]
    Upload {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("worker for entry {name:?} died: {reason}")]
    Worker { name: String, reason: String },
}
