//! Weighted scheduler: inverse-CDF sampling over the current targets.
//!
//! Each draw is independent: it reads the latest target list and the
//! latest probability table, builds cumulative weights in list order, and
//! picks the first target whose cumulative weight reaches a uniform
//! random value in `[0, total)`.

use std::sync::Arc;

use rand::Rng;

use reachgrid_core::Target;
use reachgrid_stats::StatsAggregator;

use crate::source::TargetSource;
use crate::weights::{DEFAULT_WEIGHT, ProbabilityTable};

/// One element of the scheduler's endless sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Target(Target),
    /// No targets are configured. The caller skips it.
    Idle,
}

impl Draw {
    pub fn target(self) -> Option<Target> {
        match self {
            Draw::Target(t) => Some(t),
            Draw::Idle => None,
        }
    }
}

pub struct WeightedScheduler {
    source: Arc<dyn TargetSource>,
    table: Arc<ProbabilityTable>,
}

impl WeightedScheduler {
    pub fn new(source: Arc<dyn TargetSource>, bias: f64) -> Self {
        Self::with_table(source, Arc::new(ProbabilityTable::new(bias)))
    }

    pub fn with_table(source: Arc<dyn TargetSource>, table: Arc<ProbabilityTable>) -> Self {
        Self { source, table }
    }

    pub fn table(&self) -> &Arc<ProbabilityTable> {
        &self.table
    }

    /// Draw the next target using the thread-local RNG.
    pub fn next_draw(&self) -> Draw {
        self.draw_with(&mut rand::thread_rng())
    }

    /// Draw the next target with the given RNG.
    pub fn draw_with<R: Rng>(&self, rng: &mut R) -> Draw {
        let targets = self.source.current_targets();
        if targets.is_empty() {
            return Draw::Idle;
        }

        let table = self.table.current();
        let weights: Vec<f64> = targets
            .iter()
            .map(|t| table.get(t).copied().unwrap_or(DEFAULT_WEIGHT))
            .collect();

        Draw::Target(targets[pick_index(&weights, rng)].clone())
    }

    /// Rebuild weights after an awaited outcome was recorded.
    pub fn reweight(&self, stats: &StatsAggregator) {
        self.table.recompute(stats);
    }

    /// Endless iterator over draws.
    pub fn draws(&self) -> Draws<'_> {
        Draws { scheduler: self }
    }
}

/// Iterator returned by [`WeightedScheduler::draws`]. Never ends.
pub struct Draws<'a> {
    scheduler: &'a WeightedScheduler,
}

impl Iterator for Draws<'_> {
    type Item = Draw;

    fn next(&mut self) -> Option<Draw> {
        Some(self.scheduler.next_draw())
    }
}

/// Sample an index proportionally to `weights`. `weights` must be non-empty.
///
/// Falls back to a uniform pick when the weights do not sum to a positive
/// finite number.
fn pick_index<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut total = 0.0_f64;
    for w in weights {
        total += w.max(0.0);
        cumulative.push(total);
    }

    if !(total.is_finite() && total > 0.0) {
        return rng.gen_range(0..weights.len());
    }

    let point = rng.gen_range(0.0..total);
    cumulative
        .partition_point(|c| *c < point)
        .min(weights.len() - 1)
}
