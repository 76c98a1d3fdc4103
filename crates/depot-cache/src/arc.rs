//! Adaptive replacement cache (ARC).
//!
//! Resident entries live in one of two LRU lists: `recent` (seen once since
//! admission) and `frequent` (seen at least twice). Keys evicted from either
//! list are remembered without their values in the matching ghost list. A
//! re-insert that hits a ghost moves the target size `p` of the recent list
//! toward the side that would have kept it, so the split between recency and
//! frequency tunes itself to the workload. A one-off scan only ever churns
//! `recent`; entries already promoted to `frequent` survive it.
//!
//! All four lists sit behind a single mutex. No operation does I/O or
//! blocks on anything but that mutex.

use crate::CacheError;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Point-in-time counters and list sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups through `get` that found a resident entry.
    pub hits: u64,
    /// Lookups through `get` that found nothing. `contains` is not counted.
    pub misses: u64,
    /// Re-inserts of keys recently evicted from the recent list.
    pub ghost_hits_recent: u64,
    /// Re-inserts of keys recently evicted from the frequent list.
    pub ghost_hits_frequent: u64,
    pub evictions: u64,
    pub recent_len: usize,
    pub frequent_len: usize,
    pub ghost_recent_len: usize,
    pub ghost_frequent_len: usize,
    /// Current adaptive target size of the recent list.
    pub target_recent: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Resident entry count.
    pub fn len(&self) -> usize {
        self.recent_len + self.frequent_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit rate as a fraction in `0.0..=1.0`; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct ArcState<K: Hash + Eq, V> {
    capacity: usize,
    p: usize,
    recent: LruCache<K, V>,
    frequent: LruCache<K, V>,
    ghost_recent: LruCache<K, ()>,
    ghost_frequent: LruCache<K, ()>,
    hits: u64,
    misses: u64,
    ghost_hits_recent: u64,
    ghost_hits_frequent: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone, V> ArcState<K, V> {
    fn new(capacity: usize) -> Self {
        // Lists are unbounded at the `lru` level; `capacity` is enforced here
        // so that the unlimited size never preallocates.
        Self {
            capacity,
            p: 0,
            recent: LruCache::unbounded(),
            frequent: LruCache::unbounded(),
            ghost_recent: LruCache::unbounded(),
            ghost_frequent: LruCache::unbounded(),
            hits: 0,
            misses: 0,
            ghost_hits_recent: 0,
            ghost_hits_frequent: 0,
            evictions: 0,
        }
    }

    fn resident(&self) -> usize {
        self.recent.len() + self.frequent.len()
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(value) = self.recent.pop(key) {
            self.hits += 1;
            self.frequent.put(key.clone(), value);
            return self.frequent.peek(key);
        }
        if self.frequent.contains(key) {
            self.hits += 1;
            return self.frequent.get(key);
        }
        self.misses += 1;
        None
    }

    fn put(&mut self, key: K, value: V) {
        if self.recent.pop(&key).is_some() || self.frequent.contains(&key) {
            self.frequent.put(key, value);
            return;
        }

        if self.ghost_recent.contains(&key) {
            let delta = ratio(self.ghost_frequent.len(), self.ghost_recent.len());
            self.p = self.p.saturating_add(delta).min(self.capacity);
            self.ghost_hits_recent += 1;
            if self.resident() >= self.capacity {
                self.replace(false);
            }
            self.ghost_recent.pop(&key);
            self.frequent.put(key, value);
            return;
        }

        if self.ghost_frequent.contains(&key) {
            let delta = ratio(self.ghost_recent.len(), self.ghost_frequent.len());
            self.p = self.p.saturating_sub(delta);
            self.ghost_hits_frequent += 1;
            if self.resident() >= self.capacity {
                self.replace(true);
            }
            self.ghost_frequent.pop(&key);
            self.frequent.put(key, value);
            return;
        }

        if self.resident() >= self.capacity {
            self.replace(false);
        }
        if self.ghost_recent.len() > self.capacity - self.p {
            self.ghost_recent.pop_lru();
        }
        if self.ghost_frequent.len() > self.p {
            self.ghost_frequent.pop_lru();
        }
        self.recent.put(key, value);
    }

    /// Evict exactly one resident entry into its ghost list.
    fn replace(&mut self, in_ghost_frequent: bool) {
        let recent_len = self.recent.len();
        let prefer_recent = recent_len > 0
            && (recent_len > self.p || (recent_len == self.p && in_ghost_frequent));

        let from_recent = prefer_recent || self.frequent.is_empty();
        if from_recent {
            if let Some((key, _)) = self.recent.pop_lru() {
                self.ghost_recent.put(key, ());
                self.evictions += 1;
            }
        } else if let Some((key, _)) = self.frequent.pop_lru() {
            self.ghost_frequent.put(key, ());
            self.evictions += 1;
        }
        trace!(
            from_recent,
            target_recent = self.p,
            "evicted cache entry"
        );
        self.trim_ghosts();
    }

    fn trim_ghosts(&mut self) {
        while self.ghost_recent.len() > self.capacity {
            self.ghost_recent.pop_lru();
        }
        while self.ghost_frequent.len() > self.capacity {
            self.ghost_frequent.pop_lru();
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.ghost_recent.pop(key);
        self.ghost_frequent.pop(key);
        self.recent.pop(key).or_else(|| self.frequent.pop(key))
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            ghost_hits_recent: self.ghost_hits_recent,
            ghost_hits_frequent: self.ghost_hits_frequent,
            evictions: self.evictions,
            recent_len: self.recent.len(),
            frequent_len: self.frequent.len(),
            ghost_recent_len: self.ghost_recent.len(),
            ghost_frequent_len: self.ghost_frequent.len(),
            target_recent: self.p,
            capacity: self.capacity,
        }
    }
}

/// `max(1, numerator / denominator)`, the ARC adaptation step.
fn ratio(numerator: usize, denominator: usize) -> usize {
    if denominator == 0 {
        return 1;
    }
    (numerator / denominator).max(1)
}

/// Thread-safe fixed-capacity ARC map.
///
/// A capacity of `usize::MAX` never evicts.
pub struct AdaptiveCache<K: Hash + Eq, V> {
    state: Mutex<ArcState<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> AdaptiveCache<K, V> {
    /// Create a cache holding at most `capacity` entries. Zero is rejected.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(CacheError::InvalidCapacity)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(ArcState::new(capacity.get())),
        }
    }

    /// A cache that only shrinks through [`AdaptiveCache::remove`].
    pub fn unbounded() -> Self {
        Self::with_capacity(NonZeroUsize::MAX)
    }

    fn state(&self) -> MutexGuard<'_, ArcState<K, V>> {
        // Every mutation leaves the lists consistent before it can panic, so
        // a poisoned lock still guards usable state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `key`, promoting it to the frequent list on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        self.state().get(key).cloned()
    }

    /// Insert or replace. Evicts one entry first when full.
    pub fn put(&self, key: K, value: V) {
        self.state().put(key, value);
    }

    /// Remove `key` and forget any ghost of it. Absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.state().remove(key)
    }

    /// Whether `key` is resident, without touching its standing.
    pub fn contains(&self, key: &K) -> bool {
        let state = self.state();
        state.recent.contains(key) || state.frequent.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state().resident()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state().capacity
    }

    pub fn is_unbounded(&self) -> bool {
        self.capacity() == usize::MAX
    }

    /// Drop every entry and ghost and reset the adaptive target.
    pub fn purge(&self) {
        let mut state = self.state();
        state.recent.clear();
        state.frequent.clear();
        state.ghost_recent.clear();
        state.ghost_frequent.clear();
        state.p = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.state().stats()
    }
}
