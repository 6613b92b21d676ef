//! Recency cache for publication deduplication
//!
//! A bounded seen-set with strict least-recently-used eviction. Once a
//! PubId has been evicted the same publication may be routed again.

use std::num::NonZeroUsize;

use lru::LruCache;

use fedtree_core::PubId;

/// Bounded seen-set keyed by PubId
pub struct RecencyCache {
    entries: LruCache<PubId, ()>,
}

impl RecencyCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        RecencyCache {
            entries: LruCache::new(capacity),
        }
    }

    /// Create with a plain capacity, clamped to at least one entry
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Presence check. Does not change recency.
    pub fn contains(&self, key: &PubId) -> bool {
        self.entries.contains(key)
    }

    /// Presence check that marks the key most recently used
    pub fn touch(&mut self, key: &PubId) -> bool {
        self.entries.get(key).is_some()
    }

    /// Insert or refresh a key.
    ///
    /// Returns the evicted key when the cache was full.
    pub fn put(&mut self, key: PubId) -> Option<PubId> {
        match self.entries.push(key, ()) {
            Some((evicted, ())) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<PubId> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }
}

impl std::fmt::Debug for RecencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecencyCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedtree_core::BrokerId;

    fn pid(seq: u64) -> PubId {
        PubId::new(BrokerId::new(1), seq)
    }

    #[test]
    fn test_lru_eviction_order() {
        let (a, b, c, d) = (pid(0), pid(1), pid(2), pid(3));
        let mut cache = RecencyCache::with_capacity(2);

        assert_eq!(cache.put(a), None);
        assert_eq!(cache.put(b), None);
        assert_eq!(cache.put(c), Some(a));
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b) && cache.contains(&c));

        // Refresh B, so C is now the oldest
        assert!(cache.touch(&b));
        assert_eq!(cache.put(d), Some(c));
        assert!(cache.contains(&b));
        assert!(cache.contains(&d));
        assert!(!cache.contains(&c));
    }

    #[test]
    fn test_contains_does_not_refresh() {
        let mut cache = RecencyCache::with_capacity(2);
        cache.put(pid(0));
        cache.put(pid(1));

        assert!(cache.contains(&pid(0)));
        assert_eq!(cache.put(pid(2)), Some(pid(0)));
    }

    #[test]
    fn test_put_existing_refreshes_without_eviction() {
        let mut cache = RecencyCache::with_capacity(2);
        cache.put(pid(0));
        cache.put(pid(1));

        assert_eq!(cache.put(pid(0)), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys(), vec![pid(0), pid(1)]);
        assert_eq!(cache.put(pid(2)), Some(pid(1)));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = RecencyCache::with_capacity(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(pid(0));
        assert_eq!(cache.put(pid(1)), Some(pid(0)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::VecDeque;

        #[derive(Debug, Clone)]
        enum Op {
            Put(u64),
            Touch(u64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(0u64..8).prop_map(Op::Put), (0u64..8).prop_map(Op::Touch)]
        }

        proptest! {
            // Model: front is most recently used
            #[test]
            fn matches_reference_lru(cap in 1usize..5, ops in proptest::collection::vec(op(), 0..64)) {
                let mut cache = RecencyCache::with_capacity(cap);
                let mut model: VecDeque<u64> = VecDeque::new();

                for op in ops {
                    match op {
                        Op::Put(k) => {
                            if let Some(pos) = model.iter().position(|x| *x == k) {
                                model.remove(pos);
                            } else if model.len() == cap {
                                model.pop_back();
                            }
                            model.push_front(k);
                            cache.put(pid(k));
                        }
                        Op::Touch(k) => {
                            let present = model.iter().position(|x| *x == k);
                            if let Some(pos) = present {
                                model.remove(pos);
                                model.push_front(k);
                            }
                            prop_assert_eq!(cache.touch(&pid(k)), present.is_some());
                        }
                    }
                    prop_assert!(cache.len() <= cap);
                }

                let expected: Vec<PubId> = model.iter().map(|k| pid(*k)).collect();
                prop_assert_eq!(cache.keys(), expected);
            }
        }
    }
}
