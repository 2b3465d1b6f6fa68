//! Tide emission simulator.
//!
//! Boots a vault against in-memory token, vote and lock tables, replays a
//! scenario file and prints the resulting ledger as JSON.

mod scenario;
mod sim;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tide_vault::{snapshot, VaultConfig};

use crate::scenario::Scenario;
use crate::sim::Simulation;

#[derive(Parser, Debug)]
#[command(
    name = "tide-sim",
    version,
    about = "Replay emission vault scenarios against in-memory collaborators"
)]
struct Args {
    /// Vault configuration file (TOML). `TIDE_*` environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scenario file (JSON). Runs the built-in two-epoch demo when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a binary snapshot of the final vault state here
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Print only the vault state instead of the full report
    #[arg(long)]
    state_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    info!("tide-sim v{}", env!("CARGO_PKG_VERSION"));

    let config = VaultConfig::load(args.config.as_deref()).context("failed to load config")?;
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };
    info!(
        receivers = scenario.receivers.len(),
        steps = scenario.steps.len(),
        "scenario loaded"
    );

    let mut sim = Simulation::new(config, &scenario)?;
    sim.run(&scenario.steps)?;
    let report = sim.report();

    if let Some(path) = &args.snapshot_out {
        snapshot::save(path, &sim.vault().snapshot())
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    }

    let out = if args.state_only {
        snapshot::to_json(&report.state)?
    } else {
        serde_json::to_string_pretty(&report).context("failed to render report")?
    };
    println!("{out}");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout carries only the JSON report.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
