//! SharedCache: an LRU cache behind a single lock, with statistics

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Thread-safe handle to an [`LruCache`]
///
/// Every call takes one lock for its whole duration, so no caller ever sees
/// the index and recency list out of step. Clones share the same cache.
pub struct SharedCache<K, V> {
    /// LRU cache for hot data
    cache: Arc<Mutex<LruCache<K, V>>>,

    /// Cache statistics
    stats: Arc<CacheStats>,
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new shared cache with the given capacity
    ///
    /// # Errors
    /// * `Error::InvalidCapacity` if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self::from_cache(LruCache::new(capacity)?))
    }

    /// Create a new shared cache from configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(Self::from_cache(LruCache::from_config(config)?))
    }

    /// Take ownership of an existing cache
    pub fn from_cache(cache: LruCache<K, V>) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Get a copy of a value, promoting it to most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.cache.lock().get(key).cloned();
        self.stats.record_lookup(value.is_some());
        value
    }

    /// Insert or update a value
    pub fn put(&self, key: K, value: V) {
        let mut cache = self.cache.lock();
        if cache.contains(&key) {
            cache.put(key, value);
        } else {
            let evicted = cache.push(key, value);
            self.stats.record_insert(evicted.is_some());
        }
    }

    /// Return the cached value for `key`, computing and caching it on a miss
    ///
    /// `init` runs without the lock held, so it may use this cache. Two
    /// threads missing on the same key may both run `init`; the later put
    /// wins.
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = init();
        self.put(key, value.clone());
        value
    }

    /// Fallible form of [`get_or_insert_with`](Self::get_or_insert_with)
    ///
    /// An error from `init` is returned as-is and leaves the cache untouched.
    pub fn get_or_try_insert_with<F, E>(&self, key: K, init: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = init()?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// Check whether a key is cached, without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.lock().contains(key)
    }

    /// Run `f` against the locked cache
    pub fn with_cache<R>(&self, f: impl FnOnce(&LruCache<K, V>) -> R) -> R {
        f(&*self.cache.lock())
    }
}

impl<K, V> SharedCache<K, V> {
    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.cache.lock().capacity()
    }
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            stats: Arc::clone(&self.stats),
        }
    }
}
