//! Per-target counters and the recent awaited window.

use std::collections::{BTreeMap, VecDeque};

use reachgrid_core::{ProbeOutcome, ResultCategory, classify};

/// Capacity of the recent awaited-outcome window.
pub const RECENT_WINDOW: usize = 4;

/// Health counters for a single target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetStats {
    success: u64,
    failure: u64,
    canceled: u64,
    /// Responses received, by HTTP status code.
    status_codes: BTreeMap<u16, u64>,
    /// Latest awaited, non-canceled outcomes. Oldest at the front.
    recent: VecDeque<ResultCategory>,
    last_error: Option<String>,
}

impl TargetStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild stats from persisted counts. The recent window starts empty.
    pub fn from_counts(
        success: u64,
        failure: u64,
        canceled: u64,
        status_codes: BTreeMap<u16, u64>,
        last_error: Option<String>,
    ) -> Self {
        Self {
            success,
            failure,
            canceled,
            status_codes,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
            last_error,
        }
    }

    /// Account for one probe outcome.
    ///
    /// Only awaited outcomes that are not canceled enter the recent window.
    pub fn record(&mut self, outcome: &ProbeOutcome, awaited: bool) {
        let category = classify(outcome);
        match category {
            ResultCategory::Success => self.success += 1,
            ResultCategory::Failure => self.failure += 1,
            ResultCategory::Canceled => self.canceled += 1,
        }

        if let Some(status) = outcome.status_code() {
            *self.status_codes.entry(status).or_insert(0) += 1;
        }
        if let Some(message) = outcome.failure_message() {
            self.last_error = Some(message);
        }

        if awaited && category != ResultCategory::Canceled {
            if self.recent.len() == RECENT_WINDOW {
                self.recent.pop_front();
            }
            self.recent.push_back(category);
        }
    }

    pub fn count(&self, category: ResultCategory) -> u64 {
        match category {
            ResultCategory::Success => self.success,
            ResultCategory::Failure => self.failure,
            ResultCategory::Canceled => self.canceled,
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.failure + self.canceled
    }

    /// Success / (success + failure). Canceled probes carry no signal.
    /// Optimistically 1.0 before any signal arrives.
    pub fn overall_success_fraction(&self) -> f64 {
        let signal = self.success + self.failure;
        if signal == 0 {
            return 1.0;
        }
        self.success as f64 / signal as f64
    }

    /// Fraction of the recent awaited window that succeeded; 1.0 when empty.
    pub fn recent_success_fraction(&self) -> f64 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let ok = self
            .recent
            .iter()
            .filter(|c| **c == ResultCategory::Success)
            .count();
        ok as f64 / self.recent.len() as f64
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    pub fn status_codes(&self) -> &BTreeMap<u16, u64> {
        &self.status_codes
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
