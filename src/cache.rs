//! Small TTL + LRU cache.
//!
//! Entries expire `ttl` after insertion. When the cache is full, expired
//! entries are dropped first, then the least recently used one.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

/// Capacity-bounded cache with per-entry expiry.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
    capacity: usize,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }

    /// Get a live entry, marking it as recently used. Expired entries are
    /// removed.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = self.entries.get(key).map(|e| self.is_expired(e))?;
        if expired {
            self.entries.remove(key);
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(&entry.value)
    }

    /// Insert or replace an entry, evicting if the cache is full.
    pub fn insert(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }

        let tick = self.next_tick();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let mut cache = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a", 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get(&"a"), Some(&1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = TtlCache::new(Duration::from_secs(3600), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));

        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_before_lru() {
        let mut cache = TtlCache::new(Duration::from_secs(10), 2);
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("fresh", 2);
        cache.get(&"old");

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("new", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"fresh"), Some(&2));
        assert_eq!(cache.get(&"new"), Some(&3));
    }

    #[test]
    fn test_replace_does_not_evict() {
        let mut cache = TtlCache::new(Duration::from_secs(3600), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.remove(&"a"), Some(10));
    }
}
