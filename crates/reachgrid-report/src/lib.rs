//! reachgrid-report: what the prober shows and keeps.
//!
//! Every few dozen outcomes the daemon hands a stats snapshot to a
//! [`Reporter`], which prints a ranked summary and overwrites a JSON
//! document keyed by target URL. [`load_report`] reads that document back
//! for `reachd show`.

pub mod error;
pub mod render;
pub mod reporter;
pub mod store;

pub use error::{ReportError, ReportResult};
pub use render::{percent, render, render_stored};
pub use reporter::Reporter;
pub use store::{StoredCounts, StoredReport, StoredStats, load_report, persist, to_document};
