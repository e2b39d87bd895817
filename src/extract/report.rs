use serde::Serialize;

use crate::error::EntryError;

/// How a single entry's read-then-upload unit ended
#[derive(Debug)]
pub enum EntryOutcome {
    Uploaded { name: String, key: String, bytes: u64 },
    Failed { name: String, error: EntryError },
}

/// Result of one extraction run, returned to the Lambda platform.
///
/// Serializes to exactly `{"success": [...], "fail": [...]}`. Names appear in
/// the order their units finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub success: Vec<String>,
    pub fail: Vec<String>,
    /// Whether the source archive was removed after the fan-out
    #[serde(skip)]
    pub source_deleted: bool,
}

impl ExtractionReport {
    pub fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Uploaded { name, .. } => self.success.push(name),
            EntryOutcome::Failed { name, .. } => self.fail.push(name),
        }
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.fail.len()
    }
}
