pub mod plan;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use deltasync_core::{Settings, SettingsOverrides};

/// Settings shared by every subcommand that talks to the outside world.
///
/// Flags win over environment variables, which win over the settings file.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// YAML settings file.
    #[arg(long, env = "DELTASYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Factory (namespace) the replication remote is scoped to.
    #[arg(long, env = "FACTORY")]
    pub factory: Option<String>,

    /// Local repository directory.
    #[arg(long = "repo", env = "OSTREE_REPO_ROOT")]
    pub repo_root: Option<PathBuf>,

    /// Directory holding the provisioned secrets.
    #[arg(long, env = "SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Base URL of the discovery API.
    #[arg(long, env = "OTA_API_BASE")]
    pub api_base: Option<String>,

    /// Path to the `ostree` binary.
    #[arg(long = "ostree", env = "OSTREE_BIN")]
    pub ostree_bin: Option<PathBuf>,

    /// Path to the push tool.
    #[arg(long, env = "PUSH_TOOL")]
    pub push_tool: Option<PathBuf>,

    /// Name of the replication remote registered in the repository.
    #[arg(long)]
    pub remote_name: Option<String>,

    /// Progress refresh interval passed to `ostree pull`.
    #[arg(long)]
    pub update_frequency_ms: Option<u32>,

    /// Per-request HTTP timeout; unset blocks indefinitely.
    #[arg(long)]
    pub http_timeout_secs: Option<u64>,
}

impl SettingsArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            factory: self.factory.clone(),
            repo_root: self.repo_root.clone(),
            secrets_dir: self.secrets_dir.clone(),
            api_base: self.api_base.clone(),
            ostree_bin: self.ostree_bin.clone(),
            push_tool: self.push_tool.clone(),
            remote_name: self.remote_name.clone(),
            update_frequency_ms: self.update_frequency_ms,
            http_timeout_secs: self.http_timeout_secs,
        }
    }

    /// Secrets directory after layering; works without a factory.
    pub fn secrets_dir(&self) -> Result<PathBuf> {
        Settings::resolve_secrets_dir(self.config.as_deref(), self.overrides())
            .context("invalid configuration")
    }

    pub fn resolve(&self) -> Result<Settings> {
        Settings::resolve(self.config.as_deref(), self.overrides())
            .context("invalid configuration")
    }
}
