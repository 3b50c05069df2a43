use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn merge(&mut self, other: CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.entries += other.entries;
    }
}

/// Edge index for one owning edge in one direction: entity id to related ids.
#[derive(Default)]
pub struct AdjacencyCache {
    inner: RwLock<AHashMap<i64, Vec<i64>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: i64) -> Option<Vec<i64>> {
        if let Some(value) = self.inner.read().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn insert(&self, key: i64, value: Vec<i64>) {
        self.inner.write().insert(key, value);
    }

    /// Drops all entries; counters survive so stats stay cumulative.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.read().len(),
        }
    }
}

/// Outgoing and incoming indexes for every owning edge key.
#[derive(Default)]
pub struct EdgeIndex {
    edges: AHashMap<String, (AdjacencyCache, AdjacencyCache)>,
    capacity: usize,
}

impl EdgeIndex {
    pub fn new<'a>(keys: impl Iterator<Item = &'a str>, capacity: usize) -> Self {
        let edges = keys
            .map(|key| (key.to_string(), (AdjacencyCache::new(), AdjacencyCache::new())))
            .collect();
        Self { edges, capacity }
    }

    pub fn outgoing(&self, key: &str) -> Option<&AdjacencyCache> {
        self.edges.get(key).map(|(out, _)| out)
    }

    pub fn incoming(&self, key: &str) -> Option<&AdjacencyCache> {
        self.edges.get(key).map(|(_, inc)| inc)
    }

    /// Whether a cache holding `entries` may take another entry. A zero
    /// capacity disables caching.
    pub fn has_room(&self, entries: usize) -> bool {
        entries < self.capacity
    }

    pub fn clear(&self) {
        for (out, inc) in self.edges.values() {
            out.clear();
            inc.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut total = CacheStats::default();
        for (out, inc) in self.edges.values() {
            total.merge(out.stats());
            total.merge(inc.stats());
        }
        total
    }
}
