//! Stats aggregator: shared, thread-safe view of every target's health.
//!
//! The outer map is only write-locked when a target is seen for the first
//! time. Updates to an existing target take the read lock plus that
//! target's own mutex, so workers probing different targets do not contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use reachgrid_core::{ProbeOutcome, Target};

use crate::stats::TargetStats;

/// A target together with a copy of its stats at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub target: Target,
    pub stats: TargetStats,
}

impl SnapshotEntry {
    pub fn success_fraction(&self) -> f64 {
        self.stats.overall_success_fraction()
    }
}

pub struct StatsAggregator {
    targets: RwLock<HashMap<Target, Arc<Mutex<TargetStats>>>>,
    /// Outcomes recorded across all targets.
    recorded: AtomicU64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            recorded: AtomicU64::new(0),
        }
    }

    /// Record one outcome. Returns the number of outcomes recorded so far,
    /// this one included.
    pub fn record(&self, target: &Target, outcome: &ProbeOutcome, awaited: bool) -> u64 {
        let slot = self.slot(target);
        {
            let mut stats = slot.lock().expect("target stats lock");
            stats.record(outcome, awaited);
        }
        let recorded = self.recorded.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(%target, ?outcome, awaited, recorded, "outcome recorded");
        recorded
    }

    /// Fetch or lazily create the stats slot for a target.
    fn slot(&self, target: &Target) -> Arc<Mutex<TargetStats>> {
        if let Some(slot) = self.targets.read().expect("targets lock").get(target) {
            return slot.clone();
        }
        let mut targets = self.targets.write().expect("targets lock");
        targets
            .entry(target.clone())
            .or_insert_with(|| Arc::new(Mutex::new(TargetStats::new())))
            .clone()
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Acquire)
    }

    /// Copy of a single target's stats.
    pub fn get(&self, target: &Target) -> Option<TargetStats> {
        let targets = self.targets.read().expect("targets lock");
        let slot = targets.get(target)?;
        let stats = slot.lock().expect("target stats lock");
        Some(stats.clone())
    }

    /// Overall success fraction; 1.0 for a target with no signal yet.
    pub fn overall_success_fraction(&self, target: &Target) -> f64 {
        self.get(target)
            .map(|s| s.overall_success_fraction())
            .unwrap_or(1.0)
    }

    /// Recent awaited success fraction; 1.0 for a target with no signal yet.
    pub fn recent_success_fraction(&self, target: &Target) -> f64 {
        self.get(target)
            .map(|s| s.recent_success_fraction())
            .unwrap_or(1.0)
    }

    /// Recent success fraction of every target that has had at least one
    /// awaited outcome.
    pub fn recent_fractions(&self) -> Vec<(Target, f64)> {
        let targets = self.targets.read().expect("targets lock");
        targets
            .iter()
            .filter_map(|(target, slot)| {
                let stats = slot.lock().expect("target stats lock");
                (stats.recent_len() > 0)
                    .then(|| (target.clone(), stats.recent_success_fraction()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.read().expect("targets lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of all stats, worst overall success first.
    ///
    /// Every target's mutex is held at once while copying, so no outcome
    /// is half-visible across entries.
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        let targets = self.targets.read().expect("targets lock");
        let guards: Vec<_> = targets
            .iter()
            .map(|(target, slot)| (target, slot.lock().expect("target stats lock")))
            .collect();

        let mut entries: Vec<SnapshotEntry> = guards
            .iter()
            .map(|(target, stats)| SnapshotEntry {
                target: (*target).clone(),
                stats: (**stats).clone(),
            })
            .collect();
        drop(guards);

        entries.sort_by(|a, b| {
            a.success_fraction()
                .total_cmp(&b.success_fraction())
                .then_with(|| a.target.cmp(&b.target))
        });
        entries
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
