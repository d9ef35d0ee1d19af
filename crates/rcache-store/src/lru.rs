//! Capacity-bounded key/value store with least-recently-used eviction.

use std::borrow::Borrow;
use std::hash::Hash;

use lru::LruCache;
use tracing::{debug, trace};

/// Ordered key→value store bounded by a fixed capacity.
///
/// Every `get` and `put` moves the key to the most-recently-used end. After
/// every `put` and `trim` the store holds at most `capacity` entries; the
/// least-recently-used entries go first. A capacity of zero is allowed and
/// evicts each entry right after it is inserted.
///
/// Iteration (`iter`, `keys`) runs oldest-first, i.e. in eviction order.
pub struct LruStore<K: Hash + Eq, V> {
    /// Unbounded inner map; the bound is enforced by `trim` so that a zero
    /// capacity and late capacity changes behave like any other value.
    entries: LruCache<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq, V> LruStore<K, V> {
    /// Create an empty store.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
        }
    }

    /// Create a store from entries given oldest-first, then trim.
    pub fn from_entries<I>(capacity: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut store = Self::new(capacity);
        for (key, value) in entries {
            store.entries.put(key, value);
        }
        store.trim();
        store
    }

    /// Look up a key and mark it most recently used. `None` is a miss.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hit = self.entries.get(key);
        trace!(hit = hit.is_some(), "LRU lookup");
        hit
    }

    /// Mutable lookup; marks the key most recently used.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    /// Look up a key without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key)
    }

    /// Check membership without touching recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains(key)
    }

    /// Insert or overwrite, mark most recently used, then trim.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn put(&mut self, key: K, value: V) -> usize {
        self.entries.put(key, value);
        self.trim()
    }

    /// Apply `put` for every pair in iteration order.
    pub fn update<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
        self
    }

    /// Remove a key, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.pop(key)
    }

    /// Evict least-recently-used entries until within capacity.
    ///
    /// Returns the number of evicted entries.
    pub fn trim(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if self.entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                evicted,
                capacity = self.capacity,
                size = self.entries.len(),
                "Trimmed cache to capacity"
            );
        }
        evicted
    }

    /// Take every entry out, oldest-first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(pair) = self.entries.pop_lru() {
            out.push(pair);
        }
        out
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity and trim to it. Returns the number evicted.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity;
        self.trim()
    }

    /// Iterate oldest-first without touching recency.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.entries.iter().rev()
    }
}

impl<K: Hash + Eq + Clone, V> LruStore<K, V> {
    /// Keys, oldest-first.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }
}

impl<K: Hash + Eq + std::fmt::Debug, V> std::fmt::Debug for LruStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruStore")
            .field("capacity", &self.capacity)
            .field("keys", &self.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, keys: &[&str]) -> LruStore<String, usize> {
        let mut store = LruStore::new(capacity);
        for (i, key) in keys.iter().enumerate() {
            store.put(key.to_string(), i);
        }
        store
    }

    #[test]
    fn test_put_and_get() {
        let mut store = filled(10, &["a", "b"]);
        assert_eq!(store.get("a"), Some(&0));
        assert_eq!(store.get("b"), Some(&1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_miss_is_none() {
        let mut empty: LruStore<String, usize> = LruStore::new(3);
        assert_eq!(empty.get("missing"), None);

        let mut store = filled(3, &["a"]);
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_lru_eviction_keeps_newest() {
        let keys: Vec<String> = (1..=7).map(|i| format!("k{i}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let store = filled(3, &refs);

        assert_eq!(store.keys(), vec!["k5", "k6", "k7"]);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let mut store = filled(2, &["a", "b"]);
        assert!(store.get("a").is_some());
        store.put("c".to_string(), 2);

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut store = filled(2, &["a", "b"]);
        assert_eq!(store.peek("a"), Some(&0));
        store.put("c".to_string(), 2);

        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }

    #[test]
    fn test_overwrite_promotes() {
        let mut store = filled(2, &["a", "b"]);
        store.put("a".to_string(), 10);
        store.put("c".to_string(), 2);

        assert_eq!(store.keys(), vec!["a", "c"]);
        assert_eq!(store.peek("a"), Some(&10));
    }

    #[test]
    fn test_zero_capacity_accepts_and_discards() {
        let mut store: LruStore<String, usize> = LruStore::new(0);
        assert_eq!(store.put("a".to_string(), 1), 1);
        assert!(store.is_empty());
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_capacity_invariant_holds_after_every_put() {
        for capacity in 0..5 {
            let mut store = LruStore::new(capacity);
            for i in 0..20usize {
                store.put(i % 7, i);
                assert!(store.len() <= capacity);
            }
        }
    }

    #[test]
    fn test_update_applies_in_order() {
        let mut store: LruStore<&str, i32> = LruStore::new(2);
        store.update([("a", 1), ("b", 2), ("c", 3)]);

        assert_eq!(store.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_from_entries_keeps_order_and_trims() {
        let store = LruStore::from_entries(2, vec![("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(store.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_set_capacity_trims() {
        let mut store = filled(5, &["a", "b", "c", "d"]);
        assert_eq!(store.set_capacity(1), 3);
        assert_eq!(store.keys(), vec!["d"]);
    }

    #[test]
    fn test_drain_oldest_first() {
        let mut store = filled(5, &["a", "b", "c"]);
        store.get("a");
        let drained: Vec<String> = store.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(drained, vec!["b", "c", "a"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = filled(5, &["a", "b"]);
        assert_eq!(store.remove("a"), Some(0));
        assert_eq!(store.remove("a"), None);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.capacity(), 5);
    }

    #[test]
    fn test_integer_keys() {
        let mut store = LruStore::new(2);
        store.put(1u32, "one");
        store.put(2u32, "two");
        store.get(&1u32);
        store.put(3u32, "three");
        assert_eq!(store.keys(), vec![1, 3]);
    }
}
