//! Error types for deltasync-sync.
//!
//! Every variant is fatal for the run; nothing here is retried.

use std::path::PathBuf;

use thiserror::Error;

use deltasync_core::ConfigError;

/// All errors that can arise while materializing, diffing, or publishing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Non-success HTTP status or transport failure.
    #[error("transfer failed for {url}: {reason}")]
    Transfer { url: String, reason: String },

    /// The archive extraction subprocess failed.
    #[error("extraction of {source_url} failed: {reason}")]
    Extraction { source_url: String, reason: String },

    /// Preparing the repository or pulling a commit failed.
    #[error("pull of {commit} failed: {reason}")]
    Pull { commit: String, reason: String },

    /// `static-delta generate` failed.
    #[error("delta generation {from} -> {to} failed: {reason}")]
    DeltaGeneration {
        from: String,
        to: String,
        reason: String,
    },

    /// Summary regeneration or the push tool failed.
    #[error("publish failed: {reason}")]
    Publish { reason: String },

    /// A required external program could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive worker pool could not be built.
    #[error("failed to start archive workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A worker thread panicked.
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
