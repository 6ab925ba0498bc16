//! Repository finalization: summary refresh, index-scheme detection,
//! pruning, and publishing.
//!
//! Only delta artifacts and their metadata are published. `objects/` is
//! regenerable server-side and the server rebuilds `summary` on ingest, so
//! both are removed locally before the push.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use deltasync_core::ProgressTracker;

use crate::command::run_checked;
use crate::error::{io_err, SyncError};
use crate::ostree::StoreTool;

pub const OBJECTS_DIR: &str = "objects";
pub const SUMMARY_FILE: &str = "summary";
pub const DELTA_INDEXES_DIR: &str = "delta-indexes";
pub const CONFIG_FILE: &str = "config";
const INDEXED_DELTAS_KEY: &str = "indexed-deltas";

// ---------------------------------------------------------------------------
// Delta index scheme
// ---------------------------------------------------------------------------

/// Where the repository records which static deltas exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeltaIndexScheme {
    /// Per-commit index files under `delta-indexes/`.
    Indexed,
    /// Delta list embedded in the summary file.
    InSummary,
}

impl fmt::Display for DeltaIndexScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaIndexScheme::Indexed => write!(f, "indexed (delta-indexes/)"),
            DeltaIndexScheme::InSummary => write!(f, "legacy (in summary)"),
        }
    }
}

/// Indexed only when `delta-indexes/` exists and the config enables it.
pub fn detect_scheme(repo: &Path) -> Result<DeltaIndexScheme, SyncError> {
    if !repo.join(DELTA_INDEXES_DIR).is_dir() {
        return Ok(DeltaIndexScheme::InSummary);
    }

    let config = repo.join(CONFIG_FILE);
    let contents = match fs::read_to_string(&config) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DeltaIndexScheme::InSummary),
        Err(e) => return Err(io_err(&config, e)),
    };

    let enabled = contents.lines().any(|line| {
        line.split_once('=').is_some_and(|(key, value)| {
            key.trim() == INDEXED_DELTAS_KEY && value.trim().eq_ignore_ascii_case("true")
        })
    });

    Ok(if enabled {
        DeltaIndexScheme::Indexed
    } else {
        DeltaIndexScheme::InSummary
    })
}

/// Remove `objects/` and `summary`; absent entries are fine.
pub fn prune(repo: &Path) -> Result<(), SyncError> {
    let objects = repo.join(OBJECTS_DIR);
    match fs::remove_dir_all(&objects) {
        Ok(()) => tracing::info!(path = %objects.display(), "removed object store"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&objects, e)),
    }

    let summary = repo.join(SUMMARY_FILE);
    match fs::remove_file(&summary) {
        Ok(()) => tracing::debug!(path = %summary.display(), "removed summary"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&summary, e)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Uploads the trimmed repository.
pub trait Publisher {
    fn publish(&self, repo: &Path, credentials: &Path) -> Result<(), SyncError>;
}

/// Publisher backed by an external push tool.
#[derive(Debug, Clone)]
pub struct PushTool {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl PushTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Arguments placed before the push flags.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Publisher for PushTool {
    fn publish(&self, repo: &Path, credentials: &Path) -> Result<(), SyncError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("-summary")
            .arg(format!("-repo={}", repo.display()))
            .arg(format!("-creds={}", credentials.display()));
        run_checked(&mut cmd, |reason| SyncError::Publish { reason })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// finalize
// ---------------------------------------------------------------------------

/// Refresh the summary, report the index scheme, prune, and publish.
///
/// Ticks `tracker` once after a successful publish.
pub fn finalize(
    store: &dyn StoreTool,
    publisher: &dyn Publisher,
    repo: &Path,
    credentials: &Path,
    tracker: &ProgressTracker,
) -> Result<DeltaIndexScheme, SyncError> {
    store.update_summary(repo)?;

    let scheme = detect_scheme(repo)?;
    tracing::info!(%scheme, "static delta index scheme");

    prune(repo)?;
    publisher.publish(repo, credentials)?;
    tracker.tick("published repository");
    Ok(scheme)
}
