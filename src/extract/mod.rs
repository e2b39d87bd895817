//! Fan an archive's entries out into individual objects.

mod report;

pub use report::{EntryOutcome, ExtractionReport};

use futures::StreamExt;
use futures::stream;
use humansize::{DECIMAL, format_size};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::archive::ArchiveHandle;
use crate::config::{DEFAULT_WORKERS, ExtractorConfig};
use crate::error::{EntryError, ExtractError};
use crate::event::ArchiveRef;
use crate::s3::{ObjectStorage, TransferMetrics};

const SOURCE_FILE_NAME: &str = "source";

/// Downloads an archive, uploads every entry next to it and removes the
/// original. Holds no per-run state; each [`Extractor::run`] builds its own.
#[derive(Clone)]
pub struct Extractor {
    storage: Arc<dyn ObjectStorage>,
    workers: usize,
    scratch_root: PathBuf,
}

/// State shared by the units of one run, and only that run
struct RunContext {
    archive: ArchiveRef,
    handle: Arc<ArchiveHandle>,
    storage: Arc<dyn ObjectStorage>,
    metrics: Arc<TransferMetrics>,
}

impl Extractor {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Extractor {
            storage,
            workers: DEFAULT_WORKERS,
            scratch_root: std::env::temp_dir(),
        }
    }

    pub fn from_config(storage: Arc<dyn ObjectStorage>, config: &ExtractorConfig) -> Self {
        Self::new(storage)
            .with_workers(config.workers)
            .with_scratch_root(config.scratch_dir.clone())
    }

    /// Maximum number of entries in flight at once
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Extract one archive.
    ///
    /// Errors before the fan-out starts abort the run and leave the source in
    /// place. Failures of individual entries only show up in the report's
    /// `fail` list.
    #[instrument(skip(self, archive), fields(bucket = %archive.bucket, key = %archive.key))]
    pub async fn run(&self, archive: &ArchiveRef) -> Result<ExtractionReport, ExtractError> {
        let metrics = TransferMetrics::new();

        // Dropped at the end of the run, taking the download and any
        // decompressed copy with it
        let scratch = tempfile::Builder::new()
            .prefix("s3untar-")
            .tempdir_in(&self.scratch_root)
            .map_err(ExtractError::Scratch)?;

        let source_path = scratch.path().join(SOURCE_FILE_NAME);
        let size = self
            .storage
            .download(&archive.bucket, &archive.key, &source_path)
            .await?;
        metrics.record_download(size);
        info!(size = %format_size(size, DECIMAL), "downloaded archive");

        let scratch_dir = scratch.path().to_path_buf();
        let handle = spawn_blocking(move || ArchiveHandle::open(&source_path, &scratch_dir))
            .await
            .map_err(|e| ExtractError::Worker(e.to_string()))??;
        let names = handle.entry_names().to_vec();
        info!(
            entries = names.len(),
            compression = ?handle.compression(),
            workers = self.workers,
            "indexed archive"
        );

        let context = Arc::new(RunContext {
            archive: archive.clone(),
            handle: Arc::new(handle),
            storage: Arc::clone(&self.storage),
            metrics: Arc::clone(&metrics),
        });

        let mut report = ExtractionReport::default();
        let mut overwrote_source = false;

        let mut outcomes = stream::iter(names)
            .map(|name| {
                let context = Arc::clone(&context);
                async move { context.spawn_unit(name).await }
            })
            .buffer_unordered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            match &outcome {
                EntryOutcome::Uploaded { name, key, bytes } => {
                    debug!(entry = %name, %key, bytes, "uploaded entry");
                    overwrote_source |= *key == archive.key;
                }
                EntryOutcome::Failed { name, error } => {
                    warn!(entry = %name, error = %error, "entry failed");
                }
            }
            report.record(outcome);
        }
        drop(outcomes);

        // Every unit has finished; the source can go
        if overwrote_source {
            warn!("an entry was uploaded over the source key, leaving it in place");
        } else {
            match self.storage.delete(&archive.bucket, &archive.key).await {
                Ok(()) => report.source_deleted = true,
                Err(err) => error!(error = %err, "failed to delete source archive"),
            }
        }

        info!(
            succeeded = report.success.len(),
            failed = report.fail.len(),
            archive = %format_size(metrics.archive_bytes(), DECIMAL),
            uploads = metrics.upload_count(),
            uploaded = %format_size(metrics.uploaded_bytes(), DECIMAL),
            upload_time_ms = metrics.total_upload_time().as_millis() as u64,
            elapsed_ms = metrics.elapsed().as_millis() as u64,
            source_deleted = report.source_deleted,
            "extraction finished"
        );

        Ok(report)
    }
}

impl RunContext {
    /// Run one entry's unit on its own task so a panic stays local to it
    async fn spawn_unit(self: Arc<Self>, name: String) -> EntryOutcome {
        let task_name = name.clone();
        let span = tracing::debug_span!("entry", entry = %name);
        let task = tokio::spawn(async move { self.transfer(task_name).await }.instrument(span));

        match task.await {
            Ok(outcome) => outcome,
            Err(join_err) => EntryOutcome::Failed {
                error: EntryError::Worker {
                    name: name.clone(),
                    reason: join_err.to_string(),
                },
                name,
            },
        }
    }

    async fn transfer(&self, name: String) -> EntryOutcome {
        let key = self.archive.entry_key(&name);
        match self.read_and_upload(&name, &key).await {
            Ok(bytes) => EntryOutcome::Uploaded { name, key, bytes },
            Err(error) => EntryOutcome::Failed { name, error },
        }
    }

    async fn read_and_upload(&self, name: &str, key: &str) -> Result<u64, EntryError> {
        let handle = Arc::clone(&self.handle);
        let entry_name = name.to_string();
        let body = spawn_blocking(move || handle.read_entry(&entry_name))
            .await
            .map_err(|e| EntryError::Worker {
                name: name.to_string(),
                reason: e.to_string(),
            })??;

        let bytes = body.len() as u64;
        let started = Instant::now();
        self.storage
            .upload(&self.archive.bucket, key, body)
            .await
            .map_err(|source| EntryError::Upload {
                name: name.to_string(),
                source,
            })?;
        self.metrics.record_upload(bytes, started.elapsed());

        Ok(bytes)
    }
}
