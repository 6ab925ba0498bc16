//! # deltasync-sync
//!
//! Materializes commits, generates static deltas, and publishes the result.
//!
//! Call [`pipeline::run`] with a set of [`Collaborators`] to execute a whole
//! run. The collaborators are traits so each external system (HTTP archive
//! host, discovery endpoint, `ostree`, push tool) can be swapped out.

mod command;
pub mod delta;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod finalize;
pub mod http;
pub mod ostree;
pub mod pipeline;
pub mod pty;
pub mod puller;

pub use discovery::{Discovery, DiscoveryClient, PullTarget};
pub use error::SyncError;
pub use fetch::{ArchiveFetcher, ArchiveSource, Extract, FetchReport, TarExtractor};
pub use finalize::{DeltaIndexScheme, Publisher, PushTool};
pub use ostree::{OstreeCli, StoreTool};
pub use pipeline::{Collaborators, RunRequest, RunSummary};
pub use puller::CommitPuller;
