//! Delta synchronization pipeline.
//!
//! ```text
//! plan ──► archive fetch (3 workers) ─┐
//!      └─► protocol pulls ────────────┴─► delta generation ──► finalize
//! ```
//!
//! Archive downloads run on a scoped thread while this thread performs the
//! protocol pulls; both must finish before any delta is generated. Any error
//! aborts the run with no cleanup of partially written repository state.

use std::path::Path;
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;

use deltasync_core::{Delta, ProgressTracker, WorkPlan};

use crate::delta;
use crate::discovery::Discovery;
use crate::error::SyncError;
use crate::fetch::ArchiveSource;
use crate::finalize::{self, DeltaIndexScheme, Publisher};
use crate::ostree::StoreTool;
use crate::puller::CommitPuller;

/// The external systems a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a dyn StoreTool,
    pub archives: &'a dyn ArchiveSource,
    pub discovery: &'a dyn Discovery,
    pub publisher: &'a dyn Publisher,
}

/// Per-run inputs.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub repo: &'a Path,
    pub factory: &'a str,
    pub remote: &'a str,
    pub credentials: &'a Path,
}

/// What a completed run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub downloads: usize,
    pub pulls: usize,
    pub deltas_generated: usize,
    pub completed_units: u64,
    pub total_units: u64,
    pub scheme: DeltaIndexScheme,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Run the whole pipeline for `deltas`.
pub fn run(
    collab: Collaborators<'_>,
    request: RunRequest<'_>,
    deltas: &[Delta],
) -> Result<RunSummary, SyncError> {
    let started_at = Utc::now();
    let plan = WorkPlan::build(deltas);
    tracing::info!(
        downloads = plan.downloads.len(),
        pulls = plan.pulls.len(),
        total_units = plan.total_units,
        "work plan ready"
    );
    let tracker = ProgressTracker::new(plan.total_units);

    materialize(collab, request, &plan, &tracker)?;

    let deltas_generated = delta::generate_all(collab.store, request.repo, deltas, &tracker)?;

    let scheme = finalize::finalize(
        collab.store,
        collab.publisher,
        request.repo,
        request.credentials,
        &tracker,
    )?;

    Ok(RunSummary {
        downloads: plan.downloads.len(),
        pulls: plan.pulls.len(),
        deltas_generated,
        completed_units: tracker.completed(),
        total_units: tracker.total(),
        scheme,
        started_at,
        finished_at: Utc::now(),
    })
}

/// Bring every planned endpoint into the local repository.
fn materialize(
    collab: Collaborators<'_>,
    request: RunRequest<'_>,
    plan: &WorkPlan,
    tracker: &ProgressTracker,
) -> Result<(), SyncError> {
    let archives = collab.archives;
    let repo = request.repo;
    thread::scope(|scope| {
        let fetcher = (!plan.downloads.is_empty())
            .then(|| scope.spawn(move || archives.fetch_all(&plan.downloads, repo, tracker)));

        let pulled = pull_commits(collab, request, plan, tracker);

        let fetched = match fetcher {
            Some(handle) => handle
                .join()
                .unwrap_or(Err(SyncError::WorkerPanicked("archive fetch"))),
            None => Ok(()),
        };

        fetched.and(pulled)
    })
}

fn pull_commits(
    collab: Collaborators<'_>,
    request: RunRequest<'_>,
    plan: &WorkPlan,
    tracker: &ProgressTracker,
) -> Result<(), SyncError> {
    if plan.pulls.is_empty() {
        return Ok(());
    }
    let target = collab.discovery.pull_target(request.factory)?;
    let puller = CommitPuller::prepare(collab.store, request.repo, request.remote, target)?;
    puller.pull_all(&plan.pulls, tracker)
}
