//! deltasync: materialize commits, generate static deltas, publish.
//!
//! # Usage
//!
//! ```text
//! deltasync run [--dry-run] [--json] [--factory <name>] [--repo <path>] [--secrets-dir <dir>] ...
//! deltasync plan [--deltas <file>] [--secrets-dir <dir>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{plan::PlanArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "deltasync",
    version,
    about = "Synchronize an OSTree repository and publish static deltas between commits",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch or pull every endpoint, generate deltas, and publish.
    Run(RunArgs),

    /// Show how the requested deltas would be materialized.
    Plan(PlanArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Plan(args) => args.run(),
    }
}

/// Timestamped status lines on stderr; `RUST_LOG` overrides the `info` default.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
