//! Wrapper around the native `ostree` command line.
//!
//! Every operation shells out; exit status 0 is success and anything else is
//! fatal for the operation's category (pull, delta generation, publish).

use std::path::{Path, PathBuf};
use std::process::Command;

use deltasync_core::CommitId;

use crate::command::{command_line, run_checked};
use crate::error::SyncError;
use crate::pty::{self, PullProgress};

/// Operations the orchestrator needs from the local commit store.
pub trait StoreTool {
    /// Create an archive-mode repository at `repo`.
    fn init_archive(&self, repo: &Path) -> Result<(), SyncError>;

    /// Add `name` pointing at `url`, replacing any existing remote of that name.
    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), SyncError>;

    /// Pull `commit` from `remote`, presenting `token` as a bearer token.
    fn pull(
        &self,
        repo: &Path,
        remote: &str,
        commit: &CommitId,
        token: &str,
        progress: &mut PullProgress,
    ) -> Result<(), SyncError>;

    /// Generate the static delta `from -> to`.
    fn generate_delta(&self, repo: &Path, from: &CommitId, to: &CommitId)
        -> Result<(), SyncError>;

    /// Regenerate the repository summary.
    fn update_summary(&self, repo: &Path) -> Result<(), SyncError>;
}

/// [`StoreTool`] backed by the `ostree` binary.
#[derive(Debug, Clone)]
pub struct OstreeCli {
    program: PathBuf,
    prefix_args: Vec<String>,
    update_frequency_ms: u32,
}

impl OstreeCli {
    pub fn new(program: impl Into<PathBuf>, update_frequency_ms: u32) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            update_frequency_ms,
        }
    }

    /// Arguments placed before every subcommand, for wrappers such as `sudo`.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, repo: &Path, subcommand: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(subcommand)
            .arg(format!("--repo={}", repo.display()));
        cmd
    }

    fn pull_args(&self, repo: &Path, remote: &str, commit: &CommitId, token: &str) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "pull".to_string(),
            format!("--repo={}", repo.display()),
            format!("--update-frequency={}", self.update_frequency_ms),
            format!("--http-header=Authorization=Bearer {token}"),
            remote.to_string(),
            commit.to_string(),
        ]);
        args
    }
}

impl StoreTool for OstreeCli {
    fn init_archive(&self, repo: &Path) -> Result<(), SyncError> {
        let mut cmd = self.command(repo, &["init", "--mode=archive"]);
        run_checked(&mut cmd, |reason| SyncError::Pull {
            commit: "(repository init)".to_string(),
            reason,
        })?;
        Ok(())
    }

    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), SyncError> {
        let mut cmd = self.command(repo, &["remote", "add", "--force", "--no-gpg-verify"]);
        cmd.arg(name).arg(url);
        run_checked(&mut cmd, |reason| SyncError::Pull {
            commit: format!("(remote {name})"),
            reason,
        })?;
        Ok(())
    }

    fn pull(
        &self,
        repo: &Path,
        remote: &str,
        commit: &CommitId,
        token: &str,
        progress: &mut PullProgress,
    ) -> Result<(), SyncError> {
        let args = self.pull_args(repo, remote, commit, token);
        tracing::debug!(program = %self.program.display(), %commit, "spawning pull on pty");

        let exit = pty::run_attached(&self.program, &args, progress).map_err(|source| {
            SyncError::Spawn {
                program: self.program.display().to_string(),
                source,
            }
        })?;

        if !exit.success {
            let mut reason = format!(
                "{} pull exited with code {}",
                self.program.display(),
                exit.code
            );
            let diagnostics = progress.diagnostics();
            if !diagnostics.is_empty() {
                reason.push_str(": ");
                reason.push_str(&diagnostics);
            }
            return Err(SyncError::Pull {
                commit: commit.to_string(),
                reason,
            });
        }
        Ok(())
    }

    fn generate_delta(
        &self,
        repo: &Path,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<(), SyncError> {
        let mut cmd = self.command(repo, &["static-delta", "generate"]);
        cmd.arg("--from").arg(from.as_str()).arg("--to").arg(to.as_str());
        tracing::debug!(command = %command_line(&cmd), "generating delta");
        run_checked(&mut cmd, |reason| SyncError::DeltaGeneration {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        })?;
        Ok(())
    }

    fn update_summary(&self, repo: &Path) -> Result<(), SyncError> {
        let mut cmd = self.command(repo, &["summary", "-u"]);
        run_checked(&mut cmd, |reason| SyncError::Publish { reason })?;
        Ok(())
    }
}
