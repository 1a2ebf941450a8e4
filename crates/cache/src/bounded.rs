use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Fixed-capacity, recency-ordered cache.
///
/// Inserting into a full cache evicts the single least-recently-used entry.
/// `get` promotes the entry to most-recently-used. The backing storage never
/// grows beyond the configured capacity.
pub struct BoundedCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn set(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Iterate entries from most- to least-recently used without promoting.
    pub fn items(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }
}

struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
}

/// LRU cache whose entries additionally expire after a fixed time-to-live.
///
/// Expired entries are logically absent immediately, but physically reclaimed
/// lazily on the next touch or an explicit [`TtlCache::sweep_expired`].
pub struct TtlCache<K: Hash + Eq, V> {
    inner: LruCache<K, TtlEntry<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.inner.peek(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.inner.pop(key);
            return None;
        }
        self.inner.get(key).map(|entry| &entry.value)
    }

    pub fn set(&mut self, key: K, value: V) {
        self.inner.put(
            key,
            TtlEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key).map(|entry| entry.value)
    }

    pub fn contains(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Physical entry count, expired entries included until reclaimed.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Iterate non-expired entries from most- to least-recently used.
    pub fn items(&self) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        self.inner
            .iter()
            .filter(move |(_, entry)| entry.expires_at > now)
            .map(|(key, entry)| (key, &entry.value))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&mut self) -> usize
    where
        K: Clone,
    {
        let now = Instant::now();
        let expired: Vec<K> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.inner.pop(key);
        }
        expired.len()
    }
}
