//! Probability table: per-target sampling weights.
//!
//! The table is an immutable map behind an `Arc`. A reweight builds a new
//! map and swaps it in, so a draw sees either the old table or the new
//! one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use reachgrid_core::Target;
use reachgrid_stats::StatsAggregator;

/// Weight of a target that has no awaited outcome yet.
pub const DEFAULT_WEIGHT: f64 = 1.0;

pub struct ProbabilityTable {
    weights: RwLock<Arc<HashMap<Target, f64>>>,
    /// Added to every recent success fraction.
    bias: f64,
    /// Serializes reweights so a slower rebuild cannot overwrite a newer one.
    rebuild: Mutex<()>,
}

impl ProbabilityTable {
    pub fn new(bias: f64) -> Self {
        Self::with_weights(bias, HashMap::new())
    }

    /// Start from explicit weights instead of an empty table.
    pub fn with_weights(bias: f64, weights: HashMap<Target, f64>) -> Self {
        Self {
            weights: RwLock::new(Arc::new(weights)),
            bias,
            rebuild: Mutex::new(()),
        }
    }

    /// The table as of now. Later reweights do not affect the returned map.
    pub fn current(&self) -> Arc<HashMap<Target, f64>> {
        self.weights.read().expect("weights lock").clone()
    }

    pub fn weight(&self, target: &Target) -> f64 {
        self.current()
            .get(target)
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Rebuild every weight as `recent success fraction + bias`.
    pub fn recompute(&self, stats: &StatsAggregator) {
        let _rebuild = self.rebuild.lock().expect("reweight lock");
        let table: HashMap<Target, f64> = stats
            .recent_fractions()
            .into_iter()
            .map(|(target, fraction)| (target, fraction + self.bias))
            .collect();
        debug!(targets = table.len(), "probability table rebuilt");
        *self.weights.write().expect("weights lock") = Arc::new(table);
    }
}
