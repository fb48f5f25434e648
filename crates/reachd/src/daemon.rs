//! Probe mode: assembles the subsystems and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use reachgrid_core::ReachConfig;
use reachgrid_core::config::GuardSection;
use reachgrid_guard::{EgressGuard, HttpIpLookup};
use reachgrid_probe::{Executor, ExecutorConfig, HttpTransport, ReportCallback};
use reachgrid_report::Reporter;
use reachgrid_scheduler::{FileTargets, WeightedScheduler};
use reachgrid_stats::{SnapshotEntry, StatsAggregator};

/// Reports waiting to be written. Extra ones are dropped; a newer report
/// always follows.
const REPORT_QUEUE: usize = 8;

type ReportMsg = (u64, Vec<SnapshotEntry>);

pub async fn run(config: ReachConfig) -> anyhow::Result<()> {
    info!("reachd starting");

    // ── Initialize subsystems ──────────────────────────────────

    let source = FileTargets::watch(&config.targets.file)
        .with_context(|| format!("watching {}", config.targets.file.display()))?;
    info!(path = %config.targets.file.display(), "target list watched");

    let scheduler = Arc::new(WeightedScheduler::new(Arc::new(source), config.scheduler.bias));
    let stats = Arc::new(StatsAggregator::new());
    let transport = Arc::new(HttpTransport::new().context("building HTTP client")?);

    let guard = if config.guard.enabled {
        Some(start_guard(&config.guard).await?)
    } else {
        warn!("egress IP guard disabled");
        None
    };

    let reporter = Arc::new(Reporter::new(&config.report.path));
    let (report_tx, report_rx) = mpsc::channel(REPORT_QUEUE);
    let report_handle = tokio::spawn(report_loop(reporter.clone(), report_rx));

    let mut executor = Executor::new(executor_config(&config)?, scheduler, stats.clone(), transport)
        .with_report(forward_reports(report_tx));
    if let Some(guard) = guard {
        executor = executor.with_guard(guard);
    }
    let executor = Arc::new(executor);

    // ── Run until interrupted ──────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe_handle = tokio::spawn(executor.clone().run(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, stopping");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    probe_handle.await.context("probe executor panicked")?;
    // The report sender lives in the executor's callback.
    drop(executor);
    let _ = report_handle.await;

    let snapshot = stats.snapshot();
    let recorded = stats.recorded();
    tokio::task::spawn_blocking(move || reporter.report(recorded, &snapshot))
        .await
        .context("final report task panicked")?;

    info!(recorded, "reachd stopped");
    Ok(())
}

async fn start_guard(section: &GuardSection) -> anyhow::Result<Arc<EgressGuard>> {
    let lookup = HttpIpLookup::new(section.lookup_url.clone(), section.lookup_timeout()?)?;
    let guard = EgressGuard::new(Box::new(lookup), section.allowed_ips()?);
    let ip = guard
        .initialize()
        .await
        .with_context(|| format!("determining egress IP via {}", section.lookup_url))?;
    info!(%ip, check_every = section.check_every, "egress guard initialized");
    Ok(Arc::new(guard))
}

pub fn executor_config(config: &ReachConfig) -> anyhow::Result<ExecutorConfig> {
    Ok(ExecutorConfig {
        workers: config.probe.workers,
        speculative_timeout: config.probe.speculative_timeout()?,
        awaited_timeout: config.probe.awaited_timeout()?,
        awaited_every: config.probe.awaited_every,
        idle_backoff: config.probe.idle_backoff()?,
        guard_check_every: config.guard.check_every,
        report_every: config.report.every,
    })
}

/// Callback that hands snapshots to the report task without blocking the
/// worker.
fn forward_reports(tx: mpsc::Sender<ReportMsg>) -> ReportCallback {
    Arc::new(move |recorded, snapshot| {
        if tx.try_send((recorded, snapshot)).is_err() {
            debug!(recorded, "report queue full, skipping");
        }
    })
}

/// Write reports in arrival order until every sender is gone.
async fn report_loop(reporter: Arc<Reporter>, mut rx: mpsc::Receiver<ReportMsg>) {
    while let Some((recorded, snapshot)) = rx.recv().await {
        let reporter = reporter.clone();
        let written = tokio::task::spawn_blocking(move || reporter.report(recorded, &snapshot)).await;
        if let Err(e) = written {
            warn!(error = %e, recorded, "report task panicked");
        }
    }
    debug!("report loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reachgrid_core::{ProbeOutcome, Target};

    #[test]
    fn executor_config_follows_file() {
        let config = ReachConfig::from_toml_str(
            r#"
[probe]
workers = 4
speculative_timeout = "50ms"
awaited_timeout = "3s"
awaited_every = 7

[guard]
check_every = 100

[report]
every = 25
"#,
        )
        .unwrap();
        let exec = executor_config(&config).unwrap();
        assert_eq!(exec.workers, 4);
        assert_eq!(exec.speculative_timeout, Duration::from_millis(50));
        assert_eq!(exec.awaited_timeout, Duration::from_secs(3));
        assert_eq!(exec.awaited_every, 7);
        assert_eq!(exec.idle_backoff, Duration::from_millis(250));
        assert_eq!(exec.guard_check_every, 100);
        assert_eq!(exec.report_every, 25);
    }

    #[tokio::test]
    async fn forwarded_reports_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let reporter = Arc::new(Reporter::new(&path));
        let (tx, rx) = mpsc::channel(REPORT_QUEUE);
        let handle = tokio::spawn(report_loop(reporter, rx));

        let stats = StatsAggregator::new();
        let target = Target::parse("https://a.example").unwrap();
        let callback = forward_reports(tx);
        for _ in 0..3 {
            let n = stats.record(&target, &ProbeOutcome::response(200), true);
            callback(n, stats.snapshot());
        }
        drop(callback);
        handle.await.unwrap();

        let report = reachgrid_report::load_report(&path).unwrap();
        assert_eq!(report["https://a.example/"].total, 3);
    }
}
