//! Bounded known-hash sets for gossip dedup.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A fixed-capacity set of hex-encoded hashes with LRU eviction.
///
/// Used node-wide (`known_block`, `known_transaction`) and per peer to
/// suppress duplicate gossip. Eviction can in rare cases let a duplicate
/// broadcast through; handlers stay correct because inserts are idempotent.
pub struct KnownSet {
    entries: Mutex<LruCache<String, ()>>,
}

impl KnownSet {
    /// Create a set holding at most `capacity` hashes.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Mark a hash as seen. Re-marking refreshes its recency.
    pub fn insert(&self, hex_hash: &str) {
        self.entries.lock().put(hex_hash.to_string(), ());
    }

    /// True when the hash was seen recently. Refreshes recency on hit.
    pub fn contains(&self, hex_hash: &str) -> bool {
        self.entries.lock().get(hex_hash).is_some()
    }

    /// Mark a hash and report whether it was already present.
    pub fn insert_checked(&self, hex_hash: &str) -> bool {
        let mut entries = self.entries.lock();
        let seen = entries.get(hex_hash).is_some();
        entries.put(hex_hash.to_string(), ());
        seen
    }

    /// Number of tracked hashes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been marked yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let set = KnownSet::new(16);
        assert!(!set.contains("aa"));
        set.insert("aa");
        assert!(set.contains("aa"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_insert_checked_reports_prior_state() {
        let set = KnownSet::new(16);
        assert!(!set.insert_checked("aa"));
        assert!(set.insert_checked("aa"));
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let set = KnownSet::new(2);
        set.insert("a");
        set.insert("b");
        // Touch "a" so "b" is the eviction candidate.
        assert!(set.contains("a"));
        set.insert("c");

        assert!(set.contains("a"));
        assert!(!set.contains("b"));
        assert!(set.contains("c"));
        assert_eq!(set.len(), 2);
    }
}
