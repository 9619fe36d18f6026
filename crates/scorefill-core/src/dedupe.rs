//! Per-run key deduplication.

use crate::domain::Fid;
use std::collections::HashSet;

/// Admits each key at most once per run. Never persisted.
#[derive(Debug, Default)]
pub struct DedupeTracker {
    seen: HashSet<Fid>,
}

impl DedupeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `fid` and return `true` the first time it is offered;
    /// every later call with the same key returns `false`.
    pub fn admit(&mut self, fid: Fid) -> bool {
        self.seen.insert(fid)
    }

    pub fn contains(&self, fid: Fid) -> bool {
        self.seen.contains(&fid)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_true_exactly_once() {
        let mut tracker = DedupeTracker::new();
        assert!(tracker.admit(Fid(42)));
        assert!(!tracker.admit(Fid(42)));
        assert!(!tracker.admit(Fid(42)));
        assert!(tracker.admit(Fid(43)));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.contains(Fid(42)));
    }

    #[test]
    fn test_fresh_tracker_is_empty() {
        let tracker = DedupeTracker::new();
        assert!(tracker.is_empty());
        assert!(!tracker.contains(Fid(1)));
    }
}
