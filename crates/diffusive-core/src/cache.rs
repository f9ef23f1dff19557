//! Bounded FIFO caches
//!
//! [`FifoCache`] is the plain data structure: a map with a fixed capacity
//! that evicts by insertion order. [`ResultsCache`] wraps it behind a lock
//! and stores invocation handles keyed by request id; it is the single
//! authority for how long a result stays retrievable.

use diffusive_common::protocol::RequestId;
use diffusive_common::serializer::SerializerKind;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::handle::InvocationHandle;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Map with a fixed capacity, evicting the oldest inserted key.
///
/// Re-inserting a present key replaces its value but keeps its position.
/// Removed keys leave a stale marker in the order queue which is skipped at
/// eviction time and compacted away once the queue grows past twice the
/// capacity, keeping every operation amortized O(1).
#[derive(Debug)]
pub struct FifoCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (u64, V)>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `value` under `key`.
    ///
    /// # Returns
    ///
    /// The previous value for `key`, if any. When the key is new and the
    /// cache overflows, the single oldest entry is evicted.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some((_, slot)) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key.clone(), (seq, value));
        self.order.push_back((seq, key));

        if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
        if self.order.len() > self.capacity * 2 {
            self.compact();
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }

    fn is_live(&self, seq: u64, key: &K) -> bool {
        matches!(self.entries.get(key), Some((s, _)) if *s == seq)
    }

    fn evict_oldest(&mut self) {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.is_live(seq, &key) {
                self.entries.remove(&key);
                return;
            }
        }
    }

    fn compact(&mut self) {
        let order = std::mem::take(&mut self.order);
        self.order = order
            .into_iter()
            .filter(|(seq, key)| self.is_live(*seq, key))
            .collect();
    }
}

/// A cached invocation: its handle plus what is needed to decode its result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub handle: InvocationHandle,
    pub serializer: SerializerKind,
    /// Signature key of the diffuser that accepted the invocation
    pub signature: String,
}

impl CacheEntry {
    pub fn new(handle: InvocationHandle, serializer: SerializerKind, signature: impl Into<String>) -> Self {
        Self {
            handle,
            serializer,
            signature: signature.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_done()
    }
}

/// Concurrent, bounded, FIFO-evicted map from request id to invocation.
#[derive(Debug)]
pub struct ResultsCache {
    inner: Mutex<FifoCache<RequestId, CacheEntry>>,
}

impl ResultsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FifoCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FifoCache<RequestId, CacheEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `entry` under `key`, returning the entry it replaced.
    pub fn add(&self, key: impl Into<RequestId>, entry: CacheEntry) -> Option<CacheEntry> {
        let key = key.into();
        let mut cache = self.lock();
        let before = cache.len();
        let previous = cache.insert(key.clone(), entry);
        if previous.is_none() && cache.len() == before {
            debug!("Results cache full ({}), evicted oldest entry to admit {}", cache.capacity(), key);
        }
        previous
    }

    /// Stores `entry` only if `key` is not cached yet.
    ///
    /// The check and the insert happen under one lock, so of several callers
    /// racing on the same key exactly one gets `true`.
    pub fn add_if_absent(&self, key: impl Into<RequestId>, entry: CacheEntry) -> bool {
        let key = key.into();
        let mut cache = self.lock();
        if cache.contains_key(&key) {
            return false;
        }
        let before = cache.len();
        cache.insert(key.clone(), entry);
        if cache.len() == before {
            debug!("Results cache full ({}), evicted oldest entry to admit {}", cache.capacity(), key);
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(&key.to_string()).cloned()
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.lock().contains_key(&key.to_string())
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.lock().remove(&key.to_string())
    }

    /// `true` if `key` is cached and its invocation has not finished.
    pub fn is_running(&self, key: &str) -> bool {
        self.lock()
            .get(&key.to_string())
            .map(CacheEntry::is_running)
            .unwrap_or(false)
    }

    /// Number of cached invocations that have not finished.
    pub fn num_running(&self) -> usize {
        self.lock().values().filter(|e| e.is_running()).count()
    }

    /// Snapshot of the cached request ids.
    pub fn keys(&self) -> HashSet<RequestId> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

impl Default for ResultsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
