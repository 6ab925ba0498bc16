//! Error types for deltasync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Missing or malformed configuration, detected before any network or
/// subprocess activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a settings or secret file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required setting was not provided by file, environment, or flag.
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),

    /// A secret file expected in the secrets directory does not exist.
    #[error("secret not found at {path}")]
    MissingSecret { path: PathBuf },

    /// A secret file exists but holds nothing usable.
    #[error("secret at {path} is empty")]
    EmptySecret { path: PathBuf },

    /// The deltas secret is not a valid JSON list of delta records.
    #[error("failed to parse deltas at {path}: {source}")]
    InvalidDeltas {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on the optional settings file.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
