//! Work plan: split requested endpoints into archive downloads and protocol
//! pulls, and weigh the whole run in progress units.
//!
//! Unit accounting:
//! - 1 for the final publish step;
//! - per delta, 1 for materializing `to`;
//! - per `from`, 2 (materialize it, then generate the delta).

use serde::Serialize;

use crate::types::{CommitId, Delta, Route};

/// Units charged for the final publish.
pub const PUBLISH_UNITS: u64 = 1;

/// The two disjoint transfer queues plus the unit total for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkPlan {
    /// Archive URLs to fetch and extract.
    pub downloads: Vec<String>,
    /// Commits to pull over the replication protocol.
    pub pulls: Vec<CommitId>,
    pub total_units: u64,
}

impl WorkPlan {
    /// Classify every endpoint of every delta, in input order.
    ///
    /// Duplicate endpoints are kept; each appearance is charged a unit.
    pub fn build(deltas: &[Delta]) -> Self {
        let mut plan = WorkPlan {
            total_units: PUBLISH_UNITS,
            ..WorkPlan::default()
        };

        for delta in deltas {
            for endpoint in delta.endpoints() {
                match endpoint.route() {
                    Route::Download(url) => plan.downloads.push(url.to_owned()),
                    Route::Pull(commit) => plan.pulls.push(commit.clone()),
                }
            }
            plan.total_units += 1 + 2 * delta.froms.len() as u64;
        }

        plan
    }

    /// Number of static deltas the run will generate.
    pub fn delta_count(deltas: &[Delta]) -> usize {
        deltas.iter().map(|d| d.froms.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty() && self.pulls.is_empty()
    }
}
