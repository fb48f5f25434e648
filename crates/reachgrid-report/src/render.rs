//! Console ranking.

use std::fmt::Write;

use reachgrid_core::Target;
use reachgrid_stats::SnapshotEntry;

use crate::store::StoredReport;

/// Success fraction as a whole percentage, truncated.
pub fn percent(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).floor() as u64
}

/// Render a snapshot, assumed already ordered worst-first.
///
/// ```text
/// ---150---
/// 12% (48) - flaky.example
/// 100% (102) - ok.example
/// ```
pub fn render(recorded: u64, snapshot: &[SnapshotEntry]) -> String {
    let rows = snapshot
        .iter()
        .map(|e| (e.success_fraction(), e.stats.total(), e.target.host().to_string()));
    render_rows(&recorded.to_string(), rows)
}

/// Render a persisted report, worst-first.
pub fn render_stored(report: &StoredReport) -> String {
    let mut rows: Vec<(f64, u64, String)> = report
        .iter()
        .map(|(url, stats)| {
            let host = Target::parse(url)
                .map(|t| t.host().to_string())
                .unwrap_or_else(|| url.clone());
            (stats.success_rate, stats.total, host)
        })
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.2.cmp(&b.2)));

    let total: u64 = rows.iter().map(|r| r.1).sum();
    render_rows(&total.to_string(), rows)
}

fn render_rows(header: &str, rows: impl IntoIterator<Item = (f64, u64, String)>) -> String {
    let mut out = format!("---{header}---");
    for (fraction, total, host) in rows {
        let _ = write!(out, "\n{}% ({total}) - {host}", percent(fraction));
    }
    out
}
