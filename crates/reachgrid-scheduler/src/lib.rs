//! reachgrid-scheduler: decides which target to probe next.
//!
//! The scheduler yields an endless sequence of draws. Each draw reads the
//! current target list from a [`TargetSource`] and samples one target
//! from the [`ProbabilityTable`], whose weights are the recent awaited
//! success fractions plus a constant bias.
//!
//! # Architecture
//!
//! ```text
//! WeightedScheduler
//!   ├── TargetSource (static list, or file with hot reload)
//!   └── ProbabilityTable (Arc<HashMap> swapped whole on reweight)
//!         └── rebuilt from StatsAggregator::recent_fractions()
//! ```

pub mod error;
pub mod scheduler;
pub mod source;
pub mod weights;

pub use error::{SourceError, SourceResult};
pub use scheduler::{Draw, Draws, WeightedScheduler};
pub use source::{FileTargets, StaticTargets, TargetSource, parse_targets};
pub use weights::ProbabilityTable;
