//! Persisted JSON snapshot.
//!
//! The document is an object keyed by target URL:
//!
//! ```json
//! {
//!   "https://a.example/": {
//!     "counts": { "success": 41, "failure": 2, "canceled": 7 },
//!     "status_codes": { "200": 41, "503": 1 },
//!     "total": 50,
//!     "success_rate": 0.953,
//!     "recent_success_rate": 1.0,
//!     "last_error": "HTTP 503, server=nginx"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use reachgrid_core::ResultCategory;
use reachgrid_stats::{SnapshotEntry, TargetStats};

use crate::error::ReportResult;

/// Target URL → stored stats.
pub type StoredReport = BTreeMap<String, StoredStats>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCounts {
    pub success: u64,
    pub failure: u64,
    pub canceled: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStats {
    pub counts: StoredCounts,
    #[serde(default)]
    pub status_codes: BTreeMap<u16, u64>,
    pub total: u64,
    pub success_rate: f64,
    pub recent_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StoredStats {
    pub fn from_stats(stats: &TargetStats) -> Self {
        Self {
            counts: StoredCounts {
                success: stats.count(ResultCategory::Success),
                failure: stats.count(ResultCategory::Failure),
                canceled: stats.count(ResultCategory::Canceled),
            },
            status_codes: stats.status_codes().clone(),
            total: stats.total(),
            success_rate: stats.overall_success_fraction(),
            recent_success_rate: stats.recent_success_fraction(),
            last_error: stats.last_error().map(str::to_string),
        }
    }

    /// Counters as live stats. The recent window is not persisted.
    pub fn to_stats(&self) -> TargetStats {
        TargetStats::from_counts(
            self.counts.success,
            self.counts.failure,
            self.counts.canceled,
            self.status_codes.clone(),
            self.last_error.clone(),
        )
    }
}

pub fn to_document(snapshot: &[SnapshotEntry]) -> StoredReport {
    snapshot
        .iter()
        .map(|entry| (entry.target.to_string(), StoredStats::from_stats(&entry.stats)))
        .collect()
}

/// Overwrite `path` with the snapshot.
///
/// The document is written to a temporary file in the same directory and
/// renamed into place, so readers never see a partial file.
pub fn persist(path: &Path, snapshot: &[SnapshotEntry]) -> ReportResult<()> {
    let body = serde_json::to_vec_pretty(&to_document(snapshot))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), targets = snapshot.len(), "report written");
    Ok(())
}

pub fn load_report(path: &Path) -> ReportResult<StoredReport> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachgrid_core::{FailureCategory, ProbeOutcome, Target};

    fn entry(url: &str, outcomes: &[(ProbeOutcome, bool)]) -> SnapshotEntry {
        let mut stats = TargetStats::new();
        for (outcome, awaited) in outcomes {
            stats.record(outcome, *awaited);
        }
        SnapshotEntry {
            target: Target::parse(url).unwrap(),
            stats,
        }
    }

    #[test]
    fn persisted_report_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let snapshot = vec![
            entry(
                "https://a.example",
                &[
                    (ProbeOutcome::response(200), true),
                    (ProbeOutcome::response(503), true),
                    (ProbeOutcome::Canceled, false),
                ],
            ),
            entry(
                "https://b.example/health",
                &[(ProbeOutcome::failed(FailureCategory::Tls, "bad certificate"), true)],
            ),
        ];

        persist(&path, &snapshot).unwrap();
        let loaded = load_report(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        let a = &loaded["https://a.example/"];
        assert_eq!(
            a.counts,
            StoredCounts {
                success: 1,
                failure: 1,
                canceled: 1
            }
        );
        assert_eq!(a.total, 3);
        assert_eq!(a.success_rate, 0.5);
        assert_eq!(a.status_codes.get(&503), Some(&1));
        assert_eq!(a.last_error.as_deref(), Some("HTTP 503, server=N/A"));

        let b = &loaded["https://b.example/health"];
        assert_eq!(b.success_rate, 0.0);
        assert_eq!(b.last_error.as_deref(), Some("tls: bad certificate"));
        assert_eq!(b.to_stats().count(ResultCategory::Failure), 1);
    }

    #[test]
    fn persist_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");

        persist(&path, &[entry("https://old.example", &[(ProbeOutcome::response(200), true)])])
            .unwrap();
        persist(&path, &[entry("https://new.example", &[(ProbeOutcome::response(200), true)])])
            .unwrap();

        let loaded = load_report(&path).unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["https://new.example/"]);
        // No temporary files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_report_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_report(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::ReportError::Io(_)));
    }
}
