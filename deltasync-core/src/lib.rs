//! deltasync core library: domain types, work planning, progress, settings.
//!
//! - [`types`]: [`Delta`], [`Endpoint`], [`CommitId`]
//! - [`plan`]: [`WorkPlan`] classification and unit accounting
//! - [`progress`]: [`ProgressTracker`] and [`ByteProgress`]
//! - [`settings`]: [`Settings`] resolution and [`Secrets`] loading
//! - [`error`]: [`ConfigError`]

pub mod error;
pub mod plan;
pub mod progress;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use plan::WorkPlan;
pub use progress::{ByteProgress, ProgressTracker};
pub use settings::{Secrets, Settings, SettingsOverrides};
pub use types::{CommitId, Delta, Endpoint, Route};
