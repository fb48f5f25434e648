//! Executor: fixed-size pool of probe workers.
//!
//! Workers pull from the scheduler lazily, one draw per idle worker, so
//! nothing queues up ahead of the pool. Each request runs on its own task:
//! its deadline, or a panic inside the transport, only ever affects that
//! one probe.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use reachgrid_core::{FailureCategory, ProbeOutcome, Target};
use reachgrid_guard::{CheckOutcome, EgressGuard};
use reachgrid_scheduler::{Draw, WeightedScheduler};
use reachgrid_stats::{SnapshotEntry, StatsAggregator};

use crate::policy::{ProbeMode, ProbePolicy};
use crate::transport::{ProbeTransport, TransportError};

/// Invoked with the running outcome count and a fresh snapshot.
///
/// Runs on the worker that recorded the outcome; it must not block.
pub type ReportCallback = Arc<dyn Fn(u64, Vec<SnapshotEntry>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workers: usize,
    pub speculative_timeout: Duration,
    pub awaited_timeout: Duration,
    /// Every Nth probe of a target is awaited.
    pub awaited_every: u64,
    /// Pause when there is no target or probing is suspended.
    pub idle_backoff: Duration,
    /// Re-check the egress IP every this many draws.
    pub guard_check_every: u64,
    /// Invoke the report callback every this many recorded outcomes.
    pub report_every: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            speculative_timeout: Duration::from_millis(100),
            awaited_timeout: Duration::from_secs(2),
            awaited_every: 5,
            idle_backoff: Duration::from_millis(250),
            guard_check_every: 2000,
            report_every: 50,
        }
    }
}

pub struct Executor {
    config: ExecutorConfig,
    scheduler: Arc<WeightedScheduler>,
    stats: Arc<StatsAggregator>,
    transport: Arc<dyn ProbeTransport>,
    guard: Option<Arc<EgressGuard>>,
    policy: ProbePolicy,
    on_report: Option<ReportCallback>,
    /// Targets drawn so far, including ones suppressed by the guard.
    drawn: AtomicU64,
    suppressed: AtomicU64,
}

impl Executor {
    pub fn new(
        config: ExecutorConfig,
        scheduler: Arc<WeightedScheduler>,
        stats: Arc<StatsAggregator>,
        transport: Arc<dyn ProbeTransport>,
    ) -> Self {
        let policy = ProbePolicy::new(
            config.speculative_timeout,
            config.awaited_timeout,
            config.awaited_every,
        );
        Self {
            config,
            scheduler,
            stats,
            transport,
            guard: None,
            policy,
            on_report: None,
            drawn: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Gate probing on an (already initialized) egress guard.
    pub fn with_guard(mut self, guard: Arc<EgressGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Set the callback for periodic reports.
    pub fn with_report(mut self, callback: ReportCallback) -> Self {
        self.on_report = Some(callback);
        self
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn scheduler(&self) -> &Arc<WeightedScheduler> {
        &self.scheduler
    }

    pub fn drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }

    /// Draws skipped because the egress IP was not allowed.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Run the worker pool until `shutdown` flips to `true`.
    ///
    /// Workers finish their in-flight probe before exiting.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            speculative_ms = self.config.speculative_timeout.as_millis() as u64,
            awaited_ms = self.config.awaited_timeout.as_millis() as u64,
            awaited_every = self.config.awaited_every,
            "probe executor starting"
        );

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let executor = self.clone();
            let shutdown = shutdown.clone();
            pool.spawn(async move { executor.worker_loop(worker, shutdown).await });
        }

        while let Some(res) = pool.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "probe worker exited abnormally");
            }
        }
        info!(
            drawn = self.drawn(),
            recorded = self.stats.recorded(),
            "probe executor stopped"
        );
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker, "probe worker started");
        loop {
            // A dropped sender also means shutdown.
            let stop = *shutdown.borrow() || shutdown.has_changed().is_err();
            if stop {
                break;
            }

            let target = match self.scheduler.next_draw() {
                Draw::Target(t) => t,
                Draw::Idle => {
                    self.pause(&mut shutdown).await;
                    continue;
                }
            };

            let drawn = self.drawn.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(guard) = &self.guard {
                if drawn % self.config.guard_check_every.max(1) == 0 {
                    recheck_guard(guard).await;
                }
                if !guard.is_currently_allowed() {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    debug!(worker, %target, "egress IP not allowed, probe skipped");
                    self.pause(&mut shutdown).await;
                    continue;
                }
            }

            self.probe_once(&target).await;
        }
        debug!(worker, "probe worker stopped");
    }

    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.idle_backoff) => {}
            _ = shutdown.changed() => {}
        }
    }

    /// Issue one probe against `target` and record its outcome.
    pub async fn probe_once(&self, target: &Target) -> ProbeOutcome {
        let mode = self.policy.next(target);
        let deadline = self.policy.timeout(mode);
        let outcome = self.issue(target, mode, deadline).await;

        let awaited = mode.is_awaited();
        let recorded = self.stats.record(target, &outcome, awaited);
        if awaited {
            self.scheduler.reweight(&self.stats);
        }
        debug!(%target, ?mode, ?outcome, "probe finished");

        if recorded % self.config.report_every.max(1) == 0 {
            self.emit_report(recorded);
        }
        outcome
    }

    async fn issue(&self, target: &Target, mode: ProbeMode, deadline: Duration) -> ProbeOutcome {
        let transport = self.transport.clone();
        let request_target = target.clone();
        let mut request = tokio::spawn(async move {
            transport.get(&request_target, deadline).await
        });

        let result = match tokio::time::timeout(deadline, &mut request).await {
            Ok(joined) => joined,
            Err(_) => {
                request.abort();
                Ok(Err(TransportError::DeadlineExceeded))
            }
        };

        match result {
            Ok(Ok(resp)) => ProbeOutcome::Response {
                status: resp.status,
                server: resp.server,
            },
            Ok(Err(TransportError::DeadlineExceeded)) => match mode {
                ProbeMode::Speculative => ProbeOutcome::Canceled,
                ProbeMode::Awaited => ProbeOutcome::failed(
                    FailureCategory::Timeout,
                    format!("no response within {}ms", deadline.as_millis()),
                ),
            },
            Ok(Err(TransportError::Failed { category, message })) => {
                ProbeOutcome::Failed { category, message }
            }
            Err(join_err) => {
                warn!(%target, error = %join_err, "probe request task crashed");
                ProbeOutcome::failed(FailureCategory::Other, format!("request task failed: {join_err}"))
            }
        }
    }

    fn emit_report(&self, recorded: u64) {
        if let Some(callback) = &self.on_report {
            callback(recorded, self.stats.snapshot());
        }
    }
}

async fn recheck_guard(guard: &EgressGuard) {
    match guard.check().await {
        Ok(CheckOutcome::Fresh { ip, allowed }) => {
            debug!(%ip, allowed, "egress IP re-checked");
        }
        Ok(CheckOutcome::Stale { .. }) => {}
        Err(e) => error!(error = %e, "egress guard check failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use reachgrid_core::BoxFuture;
    use reachgrid_scheduler::StaticTargets;

    use crate::transport::{HttpResponse, TransportResult};

    #[derive(Clone, Copy)]
    enum Behavior {
        Status(u16),
        Hang,
        Refuse,
        Panic,
    }

    struct FakeTransport {
        behaviors: HashMap<Target, Behavior>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn new(behaviors: Vec<(Target, Behavior)>) -> Self {
            Self {
                behaviors: behaviors.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ProbeTransport for FakeTransport {
        fn get<'a>(&'a self, target: &'a Target, _deadline: Duration) -> BoxFuture<'a, TransportResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let behavior = self.behaviors[target];
            Box::pin(async move {
                match behavior {
                    Behavior::Status(status) => Ok(HttpResponse { status, server: None }),
                    Behavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(HttpResponse { status: 200, server: None })
                    }
                    Behavior::Refuse => Err(TransportError::Failed {
                        category: FailureCategory::Connection,
                        message: "connection refused".to_string(),
                    }),
                    Behavior::Panic => panic!("transport bug"),
                }
            })
        }
    }

    fn target(s: &str) -> Target {
        Target::parse(s).unwrap()
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            workers: 2,
            speculative_timeout: Duration::from_millis(20),
            awaited_timeout: Duration::from_millis(60),
            awaited_every: 2,
            idle_backoff: Duration::from_millis(10),
            guard_check_every: 1,
            report_every: 1_000_000,
        }
    }

    fn executor(behaviors: Vec<(Target, Behavior)>) -> Executor {
        let targets: Vec<Target> = behaviors.iter().map(|(t, _)| t.clone()).collect();
        let scheduler = Arc::new(WeightedScheduler::new(
            Arc::new(StaticTargets::new(targets)),
            0.1,
        ));
        Executor::new(
            config(),
            scheduler,
            Arc::new(StatsAggregator::new()),
            Arc::new(FakeTransport::new(behaviors)),
        )
    }

    #[tokio::test]
    async fn timeouts_map_by_mode() {
        let slow = target("https://slow.example");
        let exec = executor(vec![(slow.clone(), Behavior::Hang)]);

        // First probe of a target is awaited, the second speculative.
        let awaited = exec.probe_once(&slow).await;
        assert!(matches!(
            awaited,
            ProbeOutcome::Failed { category: FailureCategory::Timeout, .. }
        ));
        assert_eq!(exec.probe_once(&slow).await, ProbeOutcome::Canceled);

        let stats = exec.stats().get(&slow).unwrap();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.recent_len(), 1);
        assert_eq!(stats.overall_success_fraction(), 0.0);
    }

    #[tokio::test]
    async fn transport_errors_become_failures() {
        let down = target("https://down.example");
        let exec = executor(vec![(down.clone(), Behavior::Refuse)]);
        assert_eq!(
            exec.probe_once(&down).await,
            ProbeOutcome::failed(FailureCategory::Connection, "connection refused")
        );
    }

    #[tokio::test]
    async fn panicking_transport_is_contained() {
        let buggy = target("https://buggy.example");
        let exec = executor(vec![(buggy.clone(), Behavior::Panic)]);
        let outcome = exec.probe_once(&buggy).await;
        assert!(matches!(
            outcome,
            ProbeOutcome::Failed { category: FailureCategory::Other, .. }
        ));
        assert_eq!(exec.stats().get(&buggy).unwrap().total(), 1);
    }

    #[tokio::test]
    async fn awaited_outcomes_reweight_the_scheduler() {
        let ok = target("https://ok.example");
        let bad = target("https://bad.example");
        let exec = executor(vec![(ok.clone(), Behavior::Status(200)), (bad.clone(), Behavior::Status(500))]);

        exec.probe_once(&ok).await;
        exec.probe_once(&bad).await;

        let table = exec.scheduler().table();
        assert!((table.weight(&ok) - 1.1).abs() < 1e-9);
        assert!((table.weight(&bad) - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn report_callback_fires_on_cadence() {
        let ok = target("https://ok.example");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut cfg = config();
        cfg.report_every = 3;
        let scheduler = Arc::new(WeightedScheduler::new(
            Arc::new(StaticTargets::new(vec![ok.clone()])),
            0.1,
        ));
        let exec = Executor::new(
            cfg,
            scheduler,
            Arc::new(StatsAggregator::new()),
            Arc::new(FakeTransport::new(vec![(ok.clone(), Behavior::Status(200))])),
        )
        .with_report(Arc::new(move |recorded, snapshot| {
            let _ = tx.send((recorded, snapshot.len()));
        }));

        for _ in 0..7 {
            exec.probe_once(&ok).await;
        }
        assert_eq!(rx.recv().await, Some((3, 1)));
        assert_eq!(rx.recv().await, Some((6, 1)));
    }

    #[tokio::test]
    async fn empty_target_list_idles_until_shutdown() {
        let exec = Arc::new(executor(Vec::new()));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(exec.clone().run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("executor stops after shutdown")
            .unwrap();

        assert_eq!(exec.drawn(), 0);
        assert_eq!(exec.stats().recorded(), 0);
    }
}
