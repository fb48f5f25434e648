//! reachgrid-stats: rolling health statistics per probed target.
//!
//! Two signals are kept for every target:
//!
//! - an all-time count per [`ResultCategory`](reachgrid_core::ResultCategory),
//!   from which the overall success fraction is derived (canceled probes
//!   excluded);
//! - a four-slot FIFO of the latest *awaited* outcomes, which the
//!   scheduler uses to reweight targets quickly when health changes.
//!
//! ```text
//! StatsAggregator
//!   └── RwLock<HashMap<Target, Arc<Mutex<TargetStats>>>>
//!         └── one mutex per target, held only while mutating it
//! ```

pub mod aggregator;
pub mod stats;

pub use aggregator::{SnapshotEntry, StatsAggregator};
pub use stats::{RECENT_WINDOW, TargetStats};
