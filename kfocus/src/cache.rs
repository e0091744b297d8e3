use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Time-bounded memoization over an LRU. Entries older than the TTL are
/// treated as absent; writers that would stale a key call `invalidate`.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        // Expired entries stay resident (evicted by capacity only) so
        // `get_stale` can still serve them as a timeout fallback.
        let mut cache = self.lock();
        match cache.get(key) {
            Some((inserted, value)) if inserted.elapsed() <= self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Expired entries still present in the LRU, for callers that prefer a
    /// stale value over none (the config endpoint's timeout fallback).
    pub fn get_stale(&self, key: &K) -> Option<V> {
        let mut cache = self.lock();
        cache.get(key).map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().pop(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, (Instant, V)>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entries_are_returned() {
        let cache: TtlCache<String, u32> = TtlCache::new(8, Duration::from_secs(60));
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entries_read_as_absent_but_stale_readable() {
        let cache: TtlCache<String, u32> = TtlCache::new(8, Duration::ZERO);
        cache.insert("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get_stale(&"a".to_string()), Some(1));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(8, Duration::from_secs(60));
        cache.insert("k", 7);
        cache.invalidate(&"k");
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.get_stale(&"k"), None);
    }

    #[test]
    fn capacity_evicts_lru() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some(3));
    }
}
