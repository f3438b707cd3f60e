//! LRU (Least Recently Used) cache implementation
//!
//! Entries live in one arena (`Vec`). The recency list links them by arena
//! index between two permanent sentinel slots, so splicing never branches on
//! an empty list.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

use ahash::RandomState;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Arena slot of the MRU-side sentinel
const HEAD: usize = 0;

/// Arena slot of the LRU-side sentinel
const TAIL: usize = 1;

/// Upper bound on slots reserved up front; larger caches grow on demand
const MAX_PREALLOC: usize = 1 << 16;

/// A stored key/value record
struct Entry<K, V> {
    key: K,
    value: V,
}

/// Arena slot. `entry` is `None` for the sentinels and for free slots.
struct Node<K, V> {
    entry: Option<Entry<K, V>>,
    prev: usize,
    next: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel(prev: usize, next: usize) -> Self {
        Self {
            entry: None,
            prev,
            next,
        }
    }
}

/// LRU cache with a fixed, positive capacity
///
/// `get` and `put` are O(1). A successful `get` promotes the entry to most
/// recently used; a `put` that overflows the capacity evicts exactly one
/// entry, the least recently used one.
///
/// The cache has no internal locking. Wrap it in
/// [`SharedCache`](crate::SharedCache) to use it from several threads.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Node<K, V>>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache holding at most `capacity` entries
    ///
    /// # Errors
    /// * `Error::InvalidCapacity` if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(Error::InvalidCapacity(capacity))
    }

    /// Create a new LRU cache from an already-validated capacity
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        let reserve = capacity.min(MAX_PREALLOC);

        // Data slots start at 2. One spare slot absorbs the transient
        // `capacity + 1` occupancy before an eviction.
        let mut nodes = Vec::with_capacity(reserve + 3);
        nodes.push(Node::sentinel(HEAD, TAIL));
        nodes.push(Node::sentinel(HEAD, TAIL));

        debug!(capacity, "created LRU cache");

        Self {
            map: HashMap::with_capacity_and_hasher(reserve + 1, RandomState::new()),
            nodes,
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Create a new LRU cache from configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.capacity)
    }

    /// Get a value, promoting it to most recently used
    ///
    /// Returns `None` on a miss, in which case nothing changes.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.nodes[idx].entry.as_ref().map(|entry| &entry.value)
    }

    /// Get a value without touching its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].entry.as_ref().map(|entry| &entry.value)
    }

    /// Check whether a key is cached, without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert or update a key-value pair
    ///
    /// An existing key keeps its slot: the value is replaced and the entry
    /// promoted. A new key that overflows the capacity evicts the least
    /// recently used entry.
    pub fn put(&mut self, key: K, value: V) {
        self.push(key, value);
    }

    /// Same as [`put`](Self::put), returning the evicted entry if there was one
    pub fn push(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.replace_value(idx, value);
            self.promote(idx);
            return None;
        }

        // The entry is fully built in its slot before index and list see it.
        // The list is linked last, so it never holds a key the index lacks.
        let idx = self.alloc_node(Entry {
            key: key.clone(),
            value,
        });
        self.map.insert(key, idx);
        self.link_front(idx);

        if self.map.len() > self.capacity {
            self.evict()
        } else {
            None
        }
    }

    fn replace_value(&mut self, idx: usize, value: V) {
        if let Some(entry) = &mut self.nodes[idx].entry {
            entry.value = value;
        }
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let idx = self.nodes[TAIL].prev;
        let entry = self.nodes[idx].entry.take()?;

        self.unlink(idx);
        self.map.remove(&entry.key);
        self.free_list.push(idx);

        trace!(slot = idx, len = self.map.len(), "evicted least recently used entry");
        Some((entry.key, entry.value))
    }
}

impl<K, V> LruCache<K, V> {
    /// Get the number of cached entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently used entry
    pub fn mru(&self) -> Option<(&K, &V)> {
        self.entry_at(self.nodes[HEAD].next)
    }

    /// Least recently used entry, the next eviction victim
    pub fn lru(&self) -> Option<(&K, &V)> {
        self.entry_at(self.nodes[TAIL].prev)
    }

    /// Iterate from most to least recently used without promoting anything
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            front: self.nodes[HEAD].next,
            back: self.nodes[TAIL].prev,
            remaining: self.map.len(),
        }
    }

    fn entry_at(&self, idx: usize) -> Option<(&K, &V)> {
        self.nodes[idx]
            .entry
            .as_ref()
            .map(|entry| (&entry.key, &entry.value))
    }

    fn promote(&mut self, idx: usize) {
        if self.nodes[HEAD].next == idx {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn link_front(&mut self, idx: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[HEAD].next = idx;
    }

    fn alloc_node(&mut self, entry: Entry<K, V>) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx].entry = Some(entry);
            idx
        } else {
            self.nodes.push(Node {
                entry: Some(entry),
                prev: HEAD,
                next: TAIL,
            });
            self.nodes.len() - 1
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a LruCache<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over cached entries, most recently used first
pub struct Iter<'a, K, V> {
    nodes: &'a [Node<K, V>],
    front: usize,
    back: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.front];
        self.front = node.next;
        self.remaining -= 1;
        node.entry.as_ref().map(|entry| (&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.back];
        self.back = node.prev;
        self.remaining -= 1;
        node.entry.as_ref().map(|entry| (&entry.key, &entry.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

#[cfg(test)]
impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Walk the list from the head sentinel and check it against the index
    pub(crate) fn check_invariants(&self) {
        assert!(self.nodes[HEAD].entry.is_none());
        assert!(self.nodes[TAIL].entry.is_none());

        let mut linked = 0;
        let mut prev = HEAD;
        let mut idx = self.nodes[HEAD].next;
        while idx != TAIL {
            assert_eq!(self.nodes[idx].prev, prev, "broken back link at slot {idx}");
            let entry = self.nodes[idx]
                .entry
                .as_ref()
                .expect("linked slot holds an entry");
            assert_eq!(self.map.get(&entry.key), Some(&idx));

            linked += 1;
            assert!(linked <= self.map.len(), "list longer than index");
            prev = idx;
            idx = self.nodes[idx].next;
        }

        assert_eq!(self.nodes[TAIL].prev, prev);
        assert_eq!(linked, self.map.len());
        assert!(linked <= self.capacity);
        assert!(self.nodes.len() <= self.capacity + 3);
    }
}
