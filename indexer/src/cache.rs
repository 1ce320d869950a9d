//! Capacity-bounded metadata cache shared by all reader workers.
//!
//! Entries are evicted in least-recently-used order and never invalidated, a definition
//! changed in the database after being cached stays stale until evicted. Misses are loaded
//! through a [`LoadPlan`] so that concurrent workers never read the same cold key twice.

use lru::LruCache as LruEntries;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::metrics::{CACHE_LABEL, INDEXER_CACHE_HITS_TOTAL, INDEXER_CACHE_MISSES_TOTAL};

/// Hit and miss counters of a cache, see [`LruCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<K, V> {
    entries: LruEntries<K, V>,
    /// Keys currently being read by some worker. The receiver resolves once that read ended.
    loading: HashMap<K, watch::Receiver<()>>,
    hits: u64,
    misses: u64,
}

/// Thread-safe LRU cache handle. Clones share the same entries.
pub struct LruCache<K, V> {
    name: &'static str,
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruCache")
            .field("name", &self.name)
            .field("len", &inner.entries.len())
            .field("capacity", &inner.entries.cap())
            .finish()
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                entries: LruEntries::new(capacity),
                loading: HashMap::new(),
                hits: 0,
                misses: 0,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a copy of the cached value and marks it as most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let value = inner.entries.get(key).cloned();
        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }

        value
    }

    /// Inserts or overwrites a value and marks it as most recently used.
    pub fn put(&self, key: K, value: V) {
        self.inner.lock().entries.put(key, value);
    }

    /// Returns whether the key is cached, without touching its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }

    /// Splits `keys` into cached values, keys the caller must read and keys another caller is
    /// already reading.
    ///
    /// The caller owns the read of [`LoadPlan::keys_to_load`] until the plan is completed or
    /// dropped; concurrent plans for the same keys wait for it instead of loading them again.
    pub fn plan<I>(&self, keys: I) -> LoadPlan<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        let (loaded_tx, loaded_rx) = watch::channel(());

        let mut seen = HashSet::new();
        let mut hits = HashMap::new();
        let mut to_load = Vec::new();
        let mut pending = Vec::new();

        let mut inner = self.inner.lock();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }

            if let Some(value) = inner.entries.get(&key) {
                let value = value.clone();
                inner.hits += 1;
                hits.insert(key, value);
                continue;
            }

            inner.misses += 1;
            match inner.loading.entry(key.clone()) {
                Entry::Occupied(entry) => pending.push((key, entry.get().clone())),
                Entry::Vacant(entry) => {
                    entry.insert(loaded_rx.clone());
                    to_load.push(key);
                }
            }
        }
        drop(inner);

        counter!(INDEXER_CACHE_HITS_TOTAL, CACHE_LABEL => self.name).increment(hits.len() as u64);
        counter!(INDEXER_CACHE_MISSES_TOTAL, CACHE_LABEL => self.name)
            .increment((to_load.len() + pending.len()) as u64);

        LoadPlan {
            cache: self.clone(),
            hits,
            pending,
            guard: LoadGuard {
                inner: self.inner.clone(),
                keys: to_load,
                _loaded_tx: loaded_tx,
            },
        }
    }
}

/// Releases the keys owned by a plan and wakes the plans waiting on them.
struct LoadGuard<K, V>
where
    K: Hash + Eq,
{
    inner: Arc<Mutex<Inner<K, V>>>,
    keys: Vec<K>,
    _loaded_tx: watch::Sender<()>,
}

impl<K, V> Drop for LoadGuard<K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        for key in &self.keys {
            inner.loading.remove(key);
        }
    }
}

/// Result of [`LruCache::plan`].
pub struct LoadPlan<K, V>
where
    K: Hash + Eq,
{
    cache: LruCache<K, V>,
    hits: HashMap<K, V>,
    pending: Vec<(K, watch::Receiver<()>)>,
    guard: LoadGuard<K, V>,
}

impl<K, V> LoadPlan<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Keys that are neither cached nor being loaded elsewhere.
    pub fn keys_to_load(&self) -> &[K] {
        &self.guard.keys
    }

    pub fn hits(&self) -> &HashMap<K, V> {
        &self.hits
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Caches the values read for [`LoadPlan::keys_to_load`] and returns every value known
    /// for the planned keys.
    ///
    /// Values for keys this plan does not own are ignored. Keys that could not be loaded,
    /// here or by the plan that owned them, are absent from the result.
    pub async fn complete<I>(self, loaded: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let LoadPlan {
            cache,
            mut hits,
            pending,
            guard,
        } = self;

        {
            let mut inner = cache.inner.lock();
            for (key, value) in loaded {
                if !guard.keys.contains(&key) {
                    continue;
                }

                inner.entries.put(key.clone(), value.clone());
                hits.insert(key, value);
            }
        }
        drop(guard);

        for (key, mut loaded_rx) in pending {
            // Resolves once the owning plan released its keys.
            let _ = loaded_rx.changed().await;

            let mut inner = cache.inner.lock();
            if let Some(value) = inner.entries.get(&key) {
                let value = value.clone();
                hits.insert(key, value);
            }
        }

        hits
    }
}
