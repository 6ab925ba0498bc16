//! `deltasync run`: the full fetch / pull / delta / publish pipeline.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use deltasync_core::Secrets;
use deltasync_sync::{
    http,
    pipeline::{self, Collaborators, RunRequest, RunSummary},
    ArchiveFetcher, DiscoveryClient, OstreeCli, PushTool, TarExtractor,
};

use super::{plan::print_plan, SettingsArgs};

/// Arguments for `deltasync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Print the work plan and exit without touching the network or repository.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run summary (or dry-run plan) as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let settings = self.settings.resolve()?;
        let secrets = Secrets::load(&settings.secrets_dir).with_context(|| {
            format!(
                "failed to load secrets from {}",
                settings.secrets_dir.display()
            )
        })?;

        if self.dry_run {
            if !self.json {
                println!(
                    "[dry-run] factory '{}' repo {}",
                    settings.factory,
                    settings.repo_root.display()
                );
            }
            return print_plan(&secrets.deltas, self.json);
        }

        info!(
            factory = %settings.factory,
            repo = %settings.repo_root.display(),
            deltas = secrets.deltas.len(),
            "starting delta sync"
        );
        let agent = http::agent(settings.http_timeout);
        let store = OstreeCli::new(settings.ostree_bin.clone(), settings.update_frequency_ms);
        let archives = ArchiveFetcher::new(
            agent.clone(),
            secrets.token.clone(),
            Box::new(TarExtractor::default()),
        );
        let discovery =
            DiscoveryClient::new(agent, settings.api_base.clone(), secrets.token.clone());
        let publisher = PushTool::new(settings.push_tool.clone());

        let summary = pipeline::run(
            Collaborators {
                store: &store,
                archives: &archives,
                discovery: &discovery,
                publisher: &publisher,
            },
            RunRequest {
                repo: &settings.repo_root,
                factory: &settings.factory,
                remote: &settings.remote_name,
                credentials: &secrets.credentials,
            },
            &secrets.deltas,
        )
        .with_context(|| format!("delta sync failed for factory '{}'", settings.factory))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
            );
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!(
        "{} published {} deltas ({} archives, {} pulls, {}/{} units) in {}s",
        "✓".green().bold(),
        summary.deltas_generated,
        summary.downloads,
        summary.pulls,
        summary.completed_units,
        summary.total_units,
        elapsed.num_seconds(),
    );
    println!("  delta index: {}", summary.scheme);
}
