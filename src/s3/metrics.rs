//! Transfer accounting for a single extraction run.
//!
//! Counters are atomic so upload workers can record into a shared instance
//! without coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TransferMetrics {
    /// Size of the downloaded archive
    archive_bytes: AtomicU64,
    /// Total bytes uploaded
    uploaded_bytes: AtomicU64,
    /// Number of completed uploads
    upload_count: AtomicUsize,
    /// Total time spent in upload calls (nanoseconds)
    upload_time_ns: AtomicU64,
    started: Instant,
}

impl TransferMetrics {
    /// Create a new metrics collector wrapped in Arc for sharing
    pub fn new() -> Arc<Self> {
        Arc::new(TransferMetrics {
            archive_bytes: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
            upload_count: AtomicUsize::new(0),
            upload_time_ns: AtomicU64::new(0),
            started: Instant::now(),
        })
    }

    pub fn record_download(&self, bytes: u64) {
        self.archive_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn record_upload(&self, bytes: u64, duration: Duration) {
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.upload_count.fetch_add(1, Ordering::Relaxed);
        self.upload_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn archive_bytes(&self) -> u64 {
        self.archive_bytes.load(Ordering::Relaxed)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }

    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::Relaxed)
    }

    /// Sum of per-upload durations. Exceeds wall time when workers overlap.
    pub fn total_upload_time(&self) -> Duration {
        Duration::from_nanos(self.upload_time_ns.load(Ordering::Relaxed))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
