//! Protocol commit puller.

use std::path::Path;

use deltasync_core::{CommitId, ProgressTracker};

use crate::discovery::PullTarget;
use crate::error::SyncError;
use crate::ostree::StoreTool;
use crate::pty::PullProgress;

/// Pulls commits into a prepared repository from one authenticated remote.
pub struct CommitPuller<'a> {
    store: &'a dyn StoreTool,
    repo: &'a Path,
    remote: &'a str,
    target: PullTarget,
}

impl<'a> CommitPuller<'a> {
    /// Initialize `repo` if it has no `config` yet, then (re)register
    /// `remote` at the target's url with signature checks disabled.
    ///
    /// Safe to repeat: an existing repository is left alone and the remote is
    /// replaced.
    pub fn prepare(
        store: &'a dyn StoreTool,
        repo: &'a Path,
        remote: &'a str,
        target: PullTarget,
    ) -> Result<Self, SyncError> {
        if repo.join("config").exists() {
            tracing::debug!(repo = %repo.display(), "repository already initialized");
        } else {
            tracing::info!(repo = %repo.display(), "initializing archive repository");
            store.init_archive(repo)?;
        }
        store.add_remote(repo, remote, &target.base_url)?;

        Ok(Self {
            store,
            repo,
            remote,
            target,
        })
    }

    /// Pull one commit. No retry: a failed pull aborts the run.
    ///
    /// Returns the number of progress lines relayed from the tool.
    pub fn pull(&self, commit: &CommitId) -> Result<usize, SyncError> {
        tracing::info!(%commit, remote = self.remote, "pulling commit");
        let mut progress = PullProgress::new(commit.as_str());
        self.store.pull(
            self.repo,
            self.remote,
            commit,
            &self.target.token,
            &mut progress,
        )?;
        Ok(progress.emitted())
    }

    /// Pull every commit in order, ticking `tracker` after each one.
    pub fn pull_all(
        &self,
        commits: &[CommitId],
        tracker: &ProgressTracker,
    ) -> Result<(), SyncError> {
        for commit in commits {
            self.pull(commit)?;
            tracker.tick(format_args!("pulled {commit}"));
        }
        Ok(())
    }
}
