//! Bounded least-recently-used cache
//!
//! Recency is tracked with a monotonically increasing stamp per entry and a
//! `BTreeMap` from stamp to key, so the oldest entry is always the first key.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

struct Slot<V> {
    value: V,
    stamp: u64,
}

/// Unsynchronized LRU bookkeeping, shared by [`LruCache`] and the TTL cache
pub(crate) struct LruState<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<K, V> LruState<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Look up a key and mark it most recently used
    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.bump();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.stamp);
        slot.stamp = stamp;
        self.order.insert(stamp, key.clone());
        Some(&slot.value)
    }

    /// Look up without touching recency
    pub(crate) fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Insert or replace a value; returns the evicted key, if any
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<K> {
        let stamp = self.bump();

        if let Some(slot) = self.entries.get_mut(&key) {
            self.order.remove(&slot.stamp);
            slot.value = value;
            slot.stamp = stamp;
            self.order.insert(stamp, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };

        self.order.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp });
        evicted
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.stamp);
        Some(slot.value)
    }

    fn pop_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    /// Drop every entry for which `keep` returns false; returns how many went
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) -> usize {
        let doomed: Vec<(u64, K)> = self
            .entries
            .iter()
            .filter(|(_, slot)| !keep(&slot.value))
            .map(|(key, slot)| (slot.stamp, key.clone()))
            .collect();

        for (stamp, key) in &doomed {
            self.order.remove(stamp);
            self.entries.remove(key);
        }
        doomed.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Thread-safe LRU cache with a fixed capacity
pub struct LruCache<K, V> {
    state: Mutex<LruState<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.state.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().peek(key).is_some()
    }

    /// Insert a value, evicting the least recently used entry when full
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        self.state.lock().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.state.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }
}
