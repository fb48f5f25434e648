//! Adaptive timeout policy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reachgrid_core::Target;

/// How long a probe is allowed to take, and what its timeout means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Short deadline; running out of time is not a failure.
    Speculative,
    /// Long deadline; the outcome is trusted as a health signal.
    Awaited,
}

impl ProbeMode {
    pub fn is_awaited(&self) -> bool {
        matches!(self, ProbeMode::Awaited)
    }
}

/// Picks the mode for each probe from a per-target call counter.
///
/// The first probe of a target and every `awaited_every`-th one after it
/// are awaited.
pub struct ProbePolicy {
    speculative_timeout: Duration,
    awaited_timeout: Duration,
    awaited_every: u64,
    calls: Mutex<HashMap<Target, u64>>,
}

impl ProbePolicy {
    pub fn new(speculative_timeout: Duration, awaited_timeout: Duration, awaited_every: u64) -> Self {
        Self {
            speculative_timeout,
            awaited_timeout,
            awaited_every: awaited_every.max(1),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Mode for the next probe of `target`. Advances its counter.
    pub fn next(&self, target: &Target) -> ProbeMode {
        let mut calls = self.calls.lock().expect("probe policy lock");
        let count = calls.entry(target.clone()).or_insert(0);
        let mode = if *count % self.awaited_every == 0 {
            ProbeMode::Awaited
        } else {
            ProbeMode::Speculative
        };
        *count += 1;
        mode
    }

    pub fn timeout(&self, mode: ProbeMode) -> Duration {
        match mode {
            ProbeMode::Speculative => self.speculative_timeout,
            ProbeMode::Awaited => self.awaited_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(every: u64) -> ProbePolicy {
        ProbePolicy::new(Duration::from_millis(100), Duration::from_secs(2), every)
    }

    #[test]
    fn first_and_every_nth_probe_is_awaited() {
        let policy = policy(5);
        let t = Target::parse("https://a.example").unwrap();
        let awaited: Vec<usize> = (0..12)
            .filter(|_| policy.next(&t).is_awaited())
            .collect();
        assert_eq!(awaited, vec![0, 5, 10]);
    }

    #[test]
    fn counters_are_per_target() {
        let policy = policy(3);
        let a = Target::parse("https://a.example").unwrap();
        let b = Target::parse("https://b.example").unwrap();
        assert_eq!(policy.next(&a), ProbeMode::Awaited);
        assert_eq!(policy.next(&a), ProbeMode::Speculative);
        assert_eq!(policy.next(&b), ProbeMode::Awaited);
        assert_eq!(policy.next(&a), ProbeMode::Speculative);
        assert_eq!(policy.next(&a), ProbeMode::Awaited);
    }

    #[test]
    fn every_one_means_always_awaited() {
        let policy = policy(1);
        let t = Target::parse("https://a.example").unwrap();
        assert!((0..5).all(|_| policy.next(&t).is_awaited()));
    }

    #[test]
    fn timeout_follows_mode() {
        let policy = policy(0);
        assert_eq!(policy.timeout(ProbeMode::Speculative), Duration::from_millis(100));
        assert_eq!(policy.timeout(ProbeMode::Awaited), Duration::from_secs(2));
    }
}
