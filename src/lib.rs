//! Unpack tar archives dropped into S3 and fan their entries back out as
//! individual objects.

pub mod archive;
pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod log;
pub mod s3;

pub use error::{EntryError, ExtractError, StorageError};
pub use event::{ArchiveRef, S3Event};
pub use extract::{ExtractionReport, Extractor};
