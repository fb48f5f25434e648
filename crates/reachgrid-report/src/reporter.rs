//! Reporter: console output plus the persisted document.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use reachgrid_stats::SnapshotEntry;

use crate::error::ReportResult;
use crate::render::render;
use crate::store::persist;

pub struct Reporter {
    path: Option<PathBuf>,
    /// Highest outcome count already written. Serializes writers.
    written: Mutex<u64>,
}

impl Reporter {
    /// Print to stdout and persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            written: Mutex::new(0),
        }
    }

    /// Print only.
    pub fn console_only() -> Self {
        Self {
            path: None,
            written: Mutex::new(0),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Print and persist a snapshot. Write failures are logged and
    /// swallowed; the previous document stays in place.
    ///
    /// Returns whether the document was written.
    pub fn report(&self, recorded: u64, snapshot: &[SnapshotEntry]) -> bool {
        println!("{}", render(recorded, snapshot));
        match self.write(recorded, snapshot) {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, recorded, "failed to write report");
                false
            }
        }
    }

    /// Persist a snapshot unless a newer one was already written.
    pub fn write(&self, recorded: u64, snapshot: &[SnapshotEntry]) -> ReportResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let mut written = self.written.lock().expect("reporter lock");
        if recorded < *written {
            info!(recorded, newer = *written, "skipping stale report");
            return Ok(false);
        }
        persist(path, snapshot)?;
        *written = recorded;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachgrid_core::{ProbeOutcome, Target};
    use reachgrid_stats::StatsAggregator;

    use crate::store::load_report;

    fn snapshot_with(url: &str, n: usize) -> (u64, Vec<SnapshotEntry>) {
        let stats = StatsAggregator::new();
        let t = Target::parse(url).unwrap();
        for _ in 0..n {
            stats.record(&t, &ProbeOutcome::response(200), true);
        }
        (stats.recorded(), stats.snapshot())
    }

    #[test]
    fn older_snapshots_do_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let reporter = Reporter::new(&path);

        let (n, newer) = snapshot_with("https://new.example", 4);
        assert!(reporter.report(n, &newer));
        let (n, older) = snapshot_with("https://old.example", 2);
        assert!(!reporter.report(n, &older));

        let loaded = load_report(&path).unwrap();
        assert!(loaded.contains_key("https://new.example/"));
        assert!(!loaded.contains_key("https://old.example/"));
    }

    #[test]
    fn write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist.
        let reporter = Reporter::new(dir.path().join("missing").join("result.json"));
        let (n, snapshot) = snapshot_with("https://a.example", 1);
        assert!(!reporter.report(n, &snapshot));
        assert!(reporter.write(n, &snapshot).is_err());
    }

    #[test]
    fn console_only_never_writes() {
        let reporter = Reporter::console_only();
        let (n, snapshot) = snapshot_with("https://a.example", 1);
        assert!(!reporter.report(n, &snapshot));
        assert!(reporter.path().is_none());
    }
}
