use crate::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

/// What happened to one selected file.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Decrypted, verified and written.
    Written { bytes: u64 },
    /// The destination already existed and overwriting was off.
    Skipped,
    Failed(Arc<Error>),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// The result for one selected file.
#[derive(Debug, Clone)]
pub struct EntryReport {
    /// Position of the file among the selected files, in tree walk order.
    pub ordinal: usize,
    /// Rooted path within the title.
    pub path: String,
    /// `None` only if the path could not be mapped under the output root.
    pub destination: Option<PathBuf>,
    pub content_id: u32,
    pub outcome: Outcome,
}

/// Results of one extraction run, in tree walk order.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub entries: Vec<EntryReport>,
    /// Set if the run was cancelled before every selected file was started.
    pub cancelled: bool,
}

impl ExtractionReport {
    pub fn written(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e.outcome, Outcome::Written { .. })).count()
    }

    pub fn skipped(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e.outcome, Outcome::Skipped)).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    pub fn bytes_written(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                Outcome::Written { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }

    /// No failures and not cancelled.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed().next().is_none()
    }
}
