//! Run configuration and provisioned secrets.
//!
//! # Layering
//!
//! 1. Built-in defaults.
//! 2. Optional YAML settings file.
//! 3. [`SettingsOverrides`] (environment variables and CLI flags).
//!
//! # Secrets layout
//!
//! ```text
//! <secrets_dir>/
//!   deltas            JSON list of delta records
//!   osftok            access token
//!   credentials.zip   signing bundle handed to the push tool
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::types::Delta;

pub const DEFAULT_REPO_ROOT: &str = "/var/lib/deltasync/repo";
pub const DEFAULT_SECRETS_DIR: &str = "/secrets";
pub const DEFAULT_API_BASE: &str = "https://api.foundries.io/ota/factories";
pub const DEFAULT_OSTREE_BIN: &str = "ostree";
pub const DEFAULT_PUSH_TOOL: &str = "garage-push";
pub const DEFAULT_REMOTE_NAME: &str = "lmp";
pub const DEFAULT_UPDATE_FREQUENCY_MS: u32 = 1000;

pub const DELTAS_SECRET: &str = "deltas";
pub const TOKEN_SECRET: &str = "osftok";
pub const CREDENTIALS_SECRET: &str = "credentials.zip";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Optional values, as read from the YAML file or supplied as overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsOverrides {
    pub factory: Option<String>,
    pub repo_root: Option<PathBuf>,
    pub secrets_dir: Option<PathBuf>,
    pub api_base: Option<String>,
    pub ostree_bin: Option<PathBuf>,
    pub push_tool: Option<PathBuf>,
    pub remote_name: Option<String>,
    pub update_frequency_ms: Option<u32>,
    pub http_timeout_secs: Option<u64>,
}

impl SettingsOverrides {
    /// Values present in `other` win.
    pub fn merge(self, other: SettingsOverrides) -> SettingsOverrides {
        SettingsOverrides {
            factory: other.factory.or(self.factory),
            repo_root: other.repo_root.or(self.repo_root),
            secrets_dir: other.secrets_dir.or(self.secrets_dir),
            api_base: other.api_base.or(self.api_base),
            ostree_bin: other.ostree_bin.or(self.ostree_bin),
            push_tool: other.push_tool.or(self.push_tool),
            remote_name: other.remote_name.or(self.remote_name),
            update_frequency_ms: other.update_frequency_ms.or(self.update_frequency_ms),
            http_timeout_secs: other.http_timeout_secs.or(self.http_timeout_secs),
        }
    }

    /// Load overrides from a YAML settings file.
    pub fn load(path: &Path) -> Result<SettingsOverrides, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace the replication remote is scoped to.
    pub factory: String,
    pub repo_root: PathBuf,
    pub secrets_dir: PathBuf,
    pub api_base: String,
    pub ostree_bin: PathBuf,
    pub push_tool: PathBuf,
    pub remote_name: String,
    pub update_frequency_ms: u32,
    /// `None` blocks until the network call returns.
    pub http_timeout: Option<Duration>,
}

impl Settings {
    /// Resolve settings from an optional file plus overrides.
    ///
    /// Returns [`ConfigError::MissingSetting`] when no factory is given.
    pub fn resolve(
        file: Option<&Path>,
        overrides: SettingsOverrides,
    ) -> Result<Settings, ConfigError> {
        let merged = layered(file, overrides)?;

        let factory = merged
            .factory
            .filter(|f| !f.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("factory"))?;

        Ok(Settings {
            factory,
            repo_root: merged
                .repo_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPO_ROOT)),
            secrets_dir: merged
                .secrets_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR)),
            api_base: merged
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            ostree_bin: merged
                .ostree_bin
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OSTREE_BIN)),
            push_tool: merged
                .push_tool
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUSH_TOOL)),
            remote_name: merged
                .remote_name
                .unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string()),
            update_frequency_ms: merged
                .update_frequency_ms
                .unwrap_or(DEFAULT_UPDATE_FREQUENCY_MS),
            http_timeout: merged.http_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Resolve only the secrets directory. No factory is required.
    pub fn resolve_secrets_dir(
        file: Option<&Path>,
        overrides: SettingsOverrides,
    ) -> Result<PathBuf, ConfigError> {
        Ok(layered(file, overrides)?
            .secrets_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR)))
    }
}

fn layered(
    file: Option<&Path>,
    overrides: SettingsOverrides,
) -> Result<SettingsOverrides, ConfigError> {
    let base = match file {
        Some(path) => SettingsOverrides::load(path)?,
        None => SettingsOverrides::default(),
    };
    Ok(base.merge(overrides))
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Secrets provisioned ahead of the run.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub deltas: Vec<Delta>,
    pub token: String,
    pub credentials: PathBuf,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("deltas", &self.deltas)
            .field("token", &"<redacted>")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl Secrets {
    /// Read every secret from `dir`. Nothing is contacted over the network.
    pub fn load(dir: &Path) -> Result<Secrets, ConfigError> {
        let deltas = load_deltas(&dir.join(DELTAS_SECRET))?;

        let token_path = dir.join(TOKEN_SECRET);
        let token = read_secret(&token_path)?.trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::EmptySecret { path: token_path });
        }

        let credentials = dir.join(CREDENTIALS_SECRET);
        if !credentials.is_file() {
            return Err(ConfigError::MissingSecret { path: credentials });
        }

        Ok(Secrets {
            deltas,
            token,
            credentials,
        })
    }
}

/// Parse a JSON list of delta records.
pub fn load_deltas(path: &Path) -> Result<Vec<Delta>, ConfigError> {
    let contents = read_secret(path)?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::InvalidDeltas {
        path: path.to_path_buf(),
        source,
    })
}

fn read_secret(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingSecret {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn overrides_with_factory(factory: &str) -> SettingsOverrides {
        SettingsOverrides {
            factory: Some(factory.to_string()),
            ..SettingsOverrides::default()
        }
    }

    #[test]
    fn defaults_fill_unset_values() {
        let s = Settings::resolve(None, overrides_with_factory("acme")).expect("resolve");
        assert_eq!(s.factory, "acme");
        assert_eq!(s.repo_root, PathBuf::from(DEFAULT_REPO_ROOT));
        assert_eq!(s.remote_name, DEFAULT_REMOTE_NAME);
        assert_eq!(s.update_frequency_ms, DEFAULT_UPDATE_FREQUENCY_MS);
        assert!(s.http_timeout.is_none());
    }

    #[test]
    fn missing_factory_is_a_config_error() {
        let err = Settings::resolve(None, SettingsOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("factory")));

        let blank = Settings::resolve(None, overrides_with_factory("  ")).unwrap_err();
        assert!(matches!(blank, ConfigError::MissingSetting("factory")));
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("deltasync.yaml");
        fs::write(
            &file,
            "factory: from-file\nrepo_root: /srv/repo\nhttp_timeout_secs: 30\n",
        )
        .unwrap();

        let s = Settings::resolve(Some(&file), overrides_with_factory("from-flag")).unwrap();
        assert_eq!(s.factory, "from-flag");
        assert_eq!(s.repo_root, PathBuf::from("/srv/repo"));
        assert_eq!(s.http_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn secrets_dir_resolves_from_file_without_factory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("deltasync.yaml");
        fs::write(&file, "secrets_dir: /run/deltasync\n").unwrap();

        let from_file =
            Settings::resolve_secrets_dir(Some(&file), SettingsOverrides::default()).unwrap();
        assert_eq!(from_file, PathBuf::from("/run/deltasync"));

        let flag = SettingsOverrides {
            secrets_dir: Some(PathBuf::from("/flag")),
            ..SettingsOverrides::default()
        };
        assert_eq!(
            Settings::resolve_secrets_dir(Some(&file), flag).unwrap(),
            PathBuf::from("/flag")
        );
        assert_eq!(
            Settings::resolve_secrets_dir(None, SettingsOverrides::default()).unwrap(),
            PathBuf::from(DEFAULT_SECRETS_DIR)
        );
    }

    #[test]
    fn unknown_settings_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.yaml");
        fs::write(&file, "factory: x\nfactroy: typo\n").unwrap();
        let err = Settings::resolve(Some(&file), SettingsOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn secrets_load_trims_token() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DELTAS_SECRET), r#"[{"to": ["b", ""], "from": []}]"#).unwrap();
        fs::write(dir.path().join(TOKEN_SECRET), "tok\n").unwrap();
        fs::write(dir.path().join(CREDENTIALS_SECRET), b"PK").unwrap();

        let secrets = Secrets::load(dir.path()).expect("load");
        assert_eq!(secrets.token, "tok");
        assert_eq!(secrets.deltas.len(), 1);
        assert!(!format!("{secrets:?}").contains("tok\""));
    }

    #[test]
    fn missing_credentials_bundle_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DELTAS_SECRET), "[]").unwrap();
        fs::write(dir.path().join(TOKEN_SECRET), "tok").unwrap();

        let err = Secrets::load(dir.path()).unwrap_err();
        match err {
            ConfigError::MissingSecret { path } => {
                assert!(path.ends_with(CREDENTIALS_SECRET));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_token_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DELTAS_SECRET), "[]").unwrap();
        fs::write(dir.path().join(TOKEN_SECRET), "\n").unwrap();
        let err = Secrets::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySecret { .. }));
    }

    #[test]
    fn malformed_deltas_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DELTAS_SECRET);
        fs::write(&path, "{not json").unwrap();
        let err = load_deltas(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDeltas { .. }));
    }
}
