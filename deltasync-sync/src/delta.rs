//! Static delta generation.
//!
//! Deltas are generated one at a time on the calling thread: the store's
//! write path is not safe for concurrent delta writes. A failure stops the
//! loop; deltas already written stay in the repository.

use std::path::Path;

use deltasync_core::{Delta, ProgressTracker};

use crate::error::SyncError;
use crate::ostree::StoreTool;

/// Generate `from -> to` for every declared pair, in input order.
///
/// Returns how many deltas were generated.
pub fn generate_all(
    store: &dyn StoreTool,
    repo: &Path,
    deltas: &[Delta],
    tracker: &ProgressTracker,
) -> Result<usize, SyncError> {
    let mut generated = 0;
    for delta in deltas {
        let to = &delta.to.commit;
        for from in delta.froms.iter().map(|e| &e.commit) {
            tracing::info!(%from, %to, "generating static delta");
            store.generate_delta(repo, from, to)?;
            generated += 1;
            tracker.tick(format_args!("delta {from} -> {to}"));
        }
    }
    Ok(generated)
}
