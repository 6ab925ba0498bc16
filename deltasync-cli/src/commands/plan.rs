//! `deltasync plan`: show how requested deltas would be materialized.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use deltasync_core::{
    settings::{load_deltas, DELTAS_SECRET},
    Delta, Route, WorkPlan,
};

use super::SettingsArgs;

/// Arguments for `deltasync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Deltas JSON file (defaults to the `deltas` secret).
    #[arg(long)]
    pub deltas: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let path = match self.deltas {
            Some(path) => path,
            None => self.settings.secrets_dir()?.join(DELTAS_SECRET),
        };
        let deltas = load_deltas(&path)
            .with_context(|| format!("failed to load deltas from {}", path.display()))?;
        print_plan(&deltas, self.json)
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    plan: &'a WorkPlan,
    deltas: usize,
}

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "#")]
    delta: usize,
    #[tabled(rename = "role")]
    role: &'static str,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "route")]
    route: &'static str,
    #[tabled(rename = "source")]
    source: String,
}

/// Print the work plan for `deltas` as a table or JSON.
pub fn print_plan(deltas: &[Delta], json: bool) -> Result<()> {
    let plan = WorkPlan::build(deltas);
    let delta_count = WorkPlan::delta_count(deltas);

    if json {
        let payload = PlanJson {
            plan: &plan,
            deltas: delta_count,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
        );
        return Ok(());
    }

    if deltas.is_empty() {
        println!("No deltas requested; only the publish step would run.");
    } else {
        let rows: Vec<EndpointRow> = deltas
            .iter()
            .enumerate()
            .flat_map(|(i, delta)| {
                delta.endpoints().enumerate().map(move |(j, endpoint)| {
                    let (route, source) = match endpoint.route() {
                        Route::Download(url) => ("archive", url.to_string()),
                        Route::Pull(_) => ("pull", "-".to_string()),
                    };
                    EndpointRow {
                        delta: i + 1,
                        role: if j == 0 { "to" } else { "from" },
                        commit: endpoint.commit.to_string(),
                        route,
                        source,
                    }
                })
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    println!(
        "{} downloads | {} pulls | {} deltas | {} units",
        plan.downloads.len().to_string().bold(),
        plan.pulls.len().to_string().bold(),
        delta_count.to_string().bold(),
        plan.total_units.to_string().bold(),
    );
    Ok(())
}
