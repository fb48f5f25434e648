//! reachd: the ReachGrid prober.
//!
//! Single binary that wires the probe loop together:
//! - Target list (hot-reloaded file)
//! - Weighted scheduler + stats aggregator
//! - Egress IP guard
//! - Probe executor (bounded worker pool)
//! - Console + JSON reporting
//!
//! # Usage
//!
//! ```text
//! reachd run --config reach.toml --urls urls.txt --workers 20
//! reachd check-ip
//! reachd show result.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use reachgrid_core::ReachConfig;
use reachgrid_guard::{HttpIpLookup, IpLookup};

mod daemon;

const DEFAULT_FILTER: &str = "info,reachd=debug,reachgrid=debug";

#[derive(Parser)]
#[command(name = "reachd", about = "Adaptive HTTP reachability prober")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the target list until interrupted.
    Run {
        /// Configuration file (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Target list, one URL per line. Overrides `targets.file`.
        #[arg(long)]
        urls: Option<PathBuf>,

        /// Concurrent probe workers. Overrides `probe.workers`.
        #[arg(long)]
        workers: Option<usize>,

        /// Report document path. Overrides `report.path`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip the egress IP guard.
        #[arg(long)]
        no_guard: bool,
    },

    /// Look up the current egress IP and compare it with the allow-list.
    CheckIp {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a persisted report.
    Show {
        #[arg(default_value = "result.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the reports.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            urls,
            workers,
            output,
            no_guard,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(urls) = urls {
                config.targets.file = urls;
            }
            if let Some(workers) = workers {
                config.probe.workers = workers;
            }
            if let Some(output) = output {
                config.report.path = output;
            }
            if no_guard {
                config.guard.enabled = false;
            }
            config.validate()?;
            daemon::run(config).await
        }
        Command::CheckIp { config } => check_ip(&load_config(config.as_deref())?).await,
        Command::Show { path } => {
            let report = reachgrid_report::load_report(&path)
                .with_context(|| format!("reading report {}", path.display()))?;
            println!("{}", reachgrid_report::render_stored(&report));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ReachConfig> {
    match path {
        Some(path) => {
            let config = ReachConfig::from_file(path)?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(ReachConfig::default()),
    }
}

async fn check_ip(config: &ReachConfig) -> anyhow::Result<()> {
    let lookup = HttpIpLookup::new(
        config.guard.lookup_url.clone(),
        config.guard.lookup_timeout()?,
    )?;
    let ip = lookup
        .lookup()
        .await
        .with_context(|| format!("looking up egress IP via {}", config.guard.lookup_url))?;
    let allowed = config.guard.allowed_ips()?;
    let verdict = if allowed.is_empty() {
        "no allow-list configured"
    } else if allowed.contains(&ip) {
        "allowed"
    } else {
        "NOT allowed"
    };
    println!("{ip} ({verdict})");
    Ok(())
}
