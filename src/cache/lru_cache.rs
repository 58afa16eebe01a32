use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::debug;

/// Cache entry con marca de último acceso
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_access: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, tick: u64) -> Self {
        Self {
            value,
            last_access: AtomicU64::new(tick),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Capacity-bounded least-recently-used cache.
///
/// Reads go straight to the map and only bump the entry's access tick, so concurrent
/// readers never contend. Inserts are serialized by a write gate: eviction runs
/// *before* a new key lands, which keeps `len() <= capacity` at every point in time.
/// Recency updates that race with an eviction are best-effort.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    clock: Arc<AtomicU64>,
    write_gate: Arc<Mutex<()>>,
    counters: Arc<Counters>,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(capacity)),
            capacity: capacity.max(1),
            clock: Arc::new(AtomicU64::new(0)),
            write_gate: Arc::new(Mutex::new(())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns a clone of the cached value and marks it as most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.data.get(key) {
            Some(entry) => {
                entry.touch(self.tick());
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Checks membership without affecting recency or the hit/miss counters.
    pub fn contains(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    /// Inserts or overwrites `key`, evicting the least recently used entry when a new
    /// key would push the cache past its capacity. Returns the previous value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let _gate = self.write_gate.lock();

        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_lru();
        }

        let entry = CacheEntry::new(value, self.tick());
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let _gate = self.write_gate.lock();
        self.data.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let _gate = self.write_gate.lock();
        self.data.clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.data.len(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    // Caller holds the write gate.
    fn evict_lru(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.data.remove(&key).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("🗑️ Cache lleno ({}), entrada más antigua expulsada", self.capacity);
            }
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            clock: self.clock.clone(),
            write_gate: self.write_gate.clone(),
            counters: self.counters.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
