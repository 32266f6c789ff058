//! Temporal debouncing of per-cycle match outcomes

use crate::config::StabilizerConfig;
use std::collections::VecDeque;

/// Bounded history of "matched this cycle" flags.
///
/// Stable once at least `min_hits` of the last `capacity` cycles matched.
#[derive(Debug, Clone)]
pub struct TemporalStabilizer {
    history: VecDeque<bool>,
    capacity: usize,
    min_hits: usize,
}

impl TemporalStabilizer {
    /// A zero `capacity` is raised to one so the history stays bounded
    pub fn new(config: &StabilizerConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            min_hits: config.min_hits,
        }
    }

    /// Record one cycle and return the resulting stability
    pub fn record(&mut self, matched: bool) -> bool {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(matched);
        self.is_stable()
    }

    pub fn is_stable(&self) -> bool {
        self.hits() >= self.min_hits
    }

    pub fn hits(&self) -> usize {
        self.history.iter().filter(|&&hit| hit).count()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stabilizer() -> TemporalStabilizer {
        TemporalStabilizer::new(&StabilizerConfig::default())
    }

    #[test]
    fn test_empty_is_not_stable() {
        let s = stabilizer();
        assert!(s.is_empty());
        assert!(!s.is_stable());
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut s = stabilizer();
        for _ in 0..7 {
            s.record(true);
        }
        for _ in 0..3 {
            s.record(false);
        }
        assert!(s.is_stable());
        // Pushes out one of the leading hits
        assert!(!s.record(false));
        assert_eq!(s.len(), 10);
        assert_eq!(s.hits(), 6);
    }

    #[test]
    fn test_zero_capacity_stays_bounded() {
        let mut s = TemporalStabilizer::new(&StabilizerConfig {
            capacity: 0,
            min_hits: 1,
        });
        for _ in 0..5 {
            assert!(s.record(true));
        }
        assert_eq!(s.len(), 1);
        assert!(!s.record(false));
        assert_eq!(s.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_seven_of_ten_is_stable(order in Just((0..10).collect::<Vec<usize>>()).prop_shuffle()) {
            let mut s = stabilizer();
            for i in order {
                s.record(i < 7);
            }
            prop_assert!(s.is_stable());
        }

        #[test]
        fn prop_six_of_ten_is_not_stable(order in Just((0..10).collect::<Vec<usize>>()).prop_shuffle()) {
            let mut s = stabilizer();
            for i in order {
                s.record(i < 6);
            }
            prop_assert!(!s.is_stable());
        }

        #[test]
        fn prop_history_never_exceeds_capacity(flags in proptest::collection::vec(any::<bool>(), 0..50)) {
            let mut s = stabilizer();
            for f in &flags {
                s.record(*f);
            }
            prop_assert!(s.len() <= 10);
            let tail = flags.iter().rev().take(10).filter(|&&f| f).count();
            prop_assert_eq!(s.hits(), tail);
        }
    }
}
