//! LRU cache with hit/miss accounting
//!
//! Recency and eviction are delegated to `lru::LruCache`; this wrapper adds
//! the counters and treats a zero capacity as "caching disabled".

use std::hash::Hash;
use std::num::NonZeroUsize;

/// Cache statistics.
///
/// Counters persist for the cache's lifetime; `clear()` does not reset them.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Number of `get` calls that found an entry
    pub hits: u64,
    /// Number of `get` calls that found nothing
    pub misses: u64,
    /// Number of entries evicted due to capacity
    pub evictions: u64,
    /// hits / (hits + misses), or 0 when there were no lookups
    pub hit_rate: f64,
}

/// Bounded LRU map
pub struct LruCache<K: Hash + Eq, V> {
    /// `None` when the configured capacity is zero
    inner: Option<::lru::LruCache<K, V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq, V: Clone> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(::lru::LruCache::new),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns the configured capacity
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.cap().get())
    }

    /// Returns the number of cached entries
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.len())
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a key, counting a hit or miss and refreshing recency.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let found = self.inner.as_mut().and_then(|c| c.get(key).cloned());
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Inserts or replaces a value and marks it most recently used.
    ///
    /// Evicts the least recently used entry when at capacity.
    pub fn set(&mut self, key: K, value: V) {
        let Some(cache) = self.inner.as_mut() else {
            return;
        };
        // push returns the old entry on replace and the LRU entry on eviction
        let replacing = cache.contains(&key);
        if cache.push(key, value).is_some() && !replacing {
            self.evictions += 1;
        }
    }

    /// Membership test. Does not count as an access.
    pub fn has(&self, key: &K) -> bool {
        self.inner.as_ref().map_or(false, |c| c.contains(key))
    }

    /// Removes an entry, returning its value
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.inner.as_mut().and_then(|c| c.pop(key))
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }

    /// Returns hit/miss statistics
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
