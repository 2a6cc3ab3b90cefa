//! Bounded least-recently-used cache with per-entry time-to-live.
//!
//! Used for memoizing expensive, pure computations (inference results keyed
//! by input hash). Entries are never a source of truth: eviction only costs
//! recomputation.

use std::hash::Hash;
use std::time::{Duration, Instant};

use hashlink::LruCache;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

pub struct BoundedCache<K, V> {
    ttl: Duration,
    entries: LruCache<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> BoundedCache<K, V> {
    /// A cache holding at most `capacity` entries, each valid for `ttl`.
    ///
    /// A capacity of zero disables caching entirely.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = self.entries.peek(key)?.inserted.elapsed() >= self.ttl;
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Inserts or refreshes `key`, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.capacity() == 0 {
            return;
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}
