//! LRU cache with a fixed time-to-live per entry
//!
//! Expired entries are never returned: a lookup past expiry removes the entry
//! and reports a miss. Uses `tokio::time::Instant` so tests can pause time.

use crate::config::expiry_from_now;
use super::lru::LruState;
use parking_lot::Mutex;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

struct Expiring<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe TTL cache bounded by an LRU ceiling
pub struct TtlCache<K, V> {
    ttl: Duration,
    state: Mutex<LruState<K, Expiring<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(LruState::new(capacity)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, or `None` on miss or expiry
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.peek(key) {
            None => return None,
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            state.remove(key);
            return None;
        }

        state.get(key).map(|entry| entry.value.clone())
    }

    /// Insert a value that expires `ttl` from now
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let entry = Expiring {
            value,
            expires_at: expiry_from_now(self.ttl),
        };
        self.state.lock().insert(key, entry)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.state.lock().remove(key).map(|entry| entry.value)
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.state.lock().retain(|entry| entry.expires_at > now)
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = TtlCache::new(8, Duration::from_secs(30));
        cache.insert("dir", vec![1, 2, 3]);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get(&"dir"), Some(vec![1, 2, 3]));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"dir"), None);
        // The expired lookup removed the entry
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_resets_expiry() {
        let cache = TtlCache::new(8, Duration::from_secs(10));
        cache.insert("k", 1);

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", 2);
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_only_drops_expired() {
        let cache = TtlCache::new(8, Duration::from_secs(10));
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("new", 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn test_capacity_ceiling_evicts_lru() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");

        assert_eq!(cache.insert("c", 3), Some("b"));
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }
}
