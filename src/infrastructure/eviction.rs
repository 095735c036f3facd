//! Eviction policy adapters.
//!
//! In hexagonal architecture, this is an adapter (infrastructure layer)
//! that implements the EvictionPolicy port (application layer).

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Evicts the entry inserted longest ago once the entry limit is reached.
///
/// Access does not refresh an entry's position; only re-insertion does.
/// Entries inserted at the same instant are ordered by key, so the choice is
/// deterministic.
#[derive(Debug, Clone)]
pub struct OldestInsertionEviction {
    /// Maximum number of entries before eviction
    max_entries: usize,
}

impl OldestInsertionEviction {
    /// Create a new policy with the given entry limit.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }
}

impl<K> EvictionPolicy<K> for OldestInsertionEviction
where
    K: Clone + Ord,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.inserted_at
                    .cmp(&b.inserted_at)
                    .then_with(|| a.key.cmp(&b.key))
            })
            .map(|candidate| candidate.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }

    fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn candidate(key: &str, inserted_at: Instant) -> EvictionCandidate<String> {
        EvictionCandidate {
            key: key.to_string(),
            inserted_at,
        }
    }

    #[test]
    fn test_select_oldest() {
        let policy = OldestInsertionEviction::new(10);
        let now = Instant::now();

        let candidates = vec![
            candidate("key1", now + Duration::from_secs(10)),
            candidate("key2", now),
            candidate("key3", now + Duration::from_secs(5)),
        ];

        assert_eq!(policy.select_victim(&candidates), Some("key2".to_string()));
    }

    #[test]
    fn test_should_evict() {
        let policy = OldestInsertionEviction::new(100);

        assert!(!<OldestInsertionEviction as EvictionPolicy<String>>::should_evict(&policy, 99));
        assert!(<OldestInsertionEviction as EvictionPolicy<String>>::should_evict(&policy, 100));
        assert!(<OldestInsertionEviction as EvictionPolicy<String>>::should_evict(&policy, 101));
        assert_eq!(
            <OldestInsertionEviction as EvictionPolicy<String>>::capacity(&policy),
            100
        );
    }

    #[test]
    fn test_empty_candidates() {
        let policy = OldestInsertionEviction::new(10);
        let candidates: Vec<EvictionCandidate<String>> = vec![];

        assert_eq!(policy.select_victim(&candidates), None);
    }

    #[test]
    fn test_ties_broken_by_key() {
        let policy = OldestInsertionEviction::new(10);
        let now = Instant::now();

        let candidates = vec![
            candidate("charlie", now),
            candidate("alpha", now),
            candidate("bravo", now),
        ];

        assert_eq!(policy.select_victim(&candidates), Some("alpha".to_string()));

        let mut reversed = candidates.clone();
        reversed.reverse();
        assert_eq!(policy.select_victim(&reversed), Some("alpha".to_string()));
    }

    #[test]
    fn test_many_candidates() {
        let policy = OldestInsertionEviction::new(1000);
        let now = Instant::now();

        let candidates: Vec<_> = (0..100)
            .map(|i| candidate(&format!("key{}", i), now + Duration::from_secs(100 - i as u64)))
            .collect();

        assert_eq!(policy.select_victim(&candidates), Some("key99".to_string()));
    }
}
