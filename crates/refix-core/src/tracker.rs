//! Incremental file tracking.
//!
//! Each engine task records the files it processed in a small state file
//! after a successful run. On the next run the tracker intersects the
//! declared inputs with the host's change report to pick the subset worth
//! reprocessing. No prior state, or an explicit full-rebuild signal, means
//! every declared file is processed.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StateError;

// ---------------------------------------------------------------------------
// Change reports
// ---------------------------------------------------------------------------

/// How a file changed since the last invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One changed file as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// The host's file-change report for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub changes: Vec<FileChange>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>, kind: ChangeKind) {
        self.changes.push(FileChange {
            path: path.into(),
            kind,
        });
    }

    /// Chainable variant of [`push`](Self::push).
    pub fn with_change(mut self, path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        self.push(path, kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Paths that still exist, i.e. everything not reported removed.
    fn surviving_paths(&self) -> HashSet<&Path> {
        self.changes
            .iter()
            .filter(|change| change.kind != ChangeKind::Removed)
            .map(|change| change.path.as_path())
            .collect()
    }
}

/// What the host knows about changes for this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    /// No usable change information; process everything.
    FullRebuild,
    /// Only the reported changes happened since the prior state was written.
    Incremental(ChangeReport),
}

// ---------------------------------------------------------------------------
// Invocation state
// ---------------------------------------------------------------------------

/// Record of the last successful invocation of one engine task.
///
/// Written only after a run completes without errors; a failed run leaves
/// the previous record in place. Files removed from the project are never
/// evicted from `processed`, they simply stop matching declared inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationState {
    /// Name of the task this record belongs to.
    pub task: String,

    /// When the record was written.
    pub written_at: DateTime<Utc>,

    /// Files the engine processed in that run.
    pub processed: Vec<PathBuf>,
}

impl InvocationState {
    pub fn record(task: impl Into<String>, processed: Vec<PathBuf>) -> Self {
        Self {
            task: task.into(),
            written_at: Utc::now(),
            processed,
        }
    }

    /// Load the record at `path`.
    ///
    /// A missing file is not an error, and an unreadable record degrades to
    /// `None` so the next run falls back to a full rebuild.
    pub fn load(path: &Path) -> Result<Option<Self>, StateError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::Io(e)),
        };
        match serde_json::from_slice(&data) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable invocation state");
                Ok(None)
            }
        }
    }

    /// Write the record to `path`, replacing any previous one atomically.
    pub fn store(&self, path: &Path) -> Result<(), StateError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(StateError::Io)?;

        let data = serde_json::to_vec_pretty(self)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(parent).map_err(StateError::Io)?;
        tmp.write_all(&data).map_err(StateError::Io)?;
        tmp.persist(path).map_err(|e| StateError::Io(e.error))?;

        debug!(
            task = %self.task,
            files = self.processed.len(),
            path = %path.display(),
            "Recorded invocation state"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Computes the file subset an invocation has to reprocess.
pub struct ChangeTracker;

impl ChangeTracker {
    /// Select the declared inputs that need processing.
    ///
    /// Everything is selected when there is no prior state or the signal is
    /// [`ChangeSignal::FullRebuild`]. Otherwise only declared files the
    /// report lists as added or modified survive; removed files and files
    /// the report does not mention are skipped. Declaration order is kept.
    ///
    /// An empty result is valid: whether the invocation still runs depends
    /// on rule applicability, not on the file count.
    pub fn files_to_process(
        declared: &[PathBuf],
        prior: Option<&InvocationState>,
        signal: &ChangeSignal,
    ) -> Vec<PathBuf> {
        let report = match (prior, signal) {
            (None, _) | (_, ChangeSignal::FullRebuild) => {
                debug!(files = declared.len(), "Full rebuild, processing all declared inputs");
                return declared.to_vec();
            }
            (Some(_), ChangeSignal::Incremental(report)) => report,
        };

        let surviving = report.surviving_paths();
        let selected: Vec<PathBuf> = declared
            .iter()
            .filter(|path| surviving.contains(path.as_path()))
            .cloned()
            .collect();
        debug!(
            declared = declared.len(),
            changed = report.changes.len(),
            selected = selected.len(),
            "Incremental run, processing changed inputs only"
        );
        selected
    }
}
