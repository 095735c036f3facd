//! Bounded TTL cache for fetched payloads.
//!
//! Entries expire lazily: a lookup that finds a stale entry removes it and
//! reports a miss. When the cache is full, inserting a new key first evicts
//! the entry chosen by the eviction policy.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use crate::domain::config::CacheConfig;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::OldestInsertionEviction;
use crate::infrastructure::storage::ShardedStorage;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// A cached value and the instant it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create an entry stored at `inserted_at`.
    pub fn new(value: V, inserted_at: Instant) -> Self {
        Self { value, inserted_at }
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// When the entry was stored.
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    /// An entry is stale once its age strictly exceeds `ttl`.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// Concurrent cache with per-entry TTL and a size bound.
///
/// Reads never take the cache-wide lock. Writes are serialized so the size
/// check and the eviction that follows it cannot interleave with another
/// insertion.
///
/// # Example
/// ```
/// use fetch_governor::application::cache::TtlCache;
/// use fetch_governor::CacheConfig;
/// use std::time::Duration;
///
/// let cache = TtlCache::new(CacheConfig::new(2, Duration::from_secs(300)).unwrap());
/// cache.set("a".to_string(), 1);
/// cache.set("b".to_string(), 2);
/// cache.set("c".to_string(), 3);
///
/// assert_eq!(cache.len(), 2);
/// assert_eq!(cache.get(&"c".to_string()), Some(3));
/// ```
pub struct TtlCache<K, V, S = ShardedStorage<K, CacheEntry<V>>>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: Storage<K, CacheEntry<V>>,
{
    storage: S,
    policy: Box<dyn EvictionPolicy<K>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    metrics: Metrics,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Ord + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + Debug,
{
    /// Create a cache backed by [`ShardedStorage`] using the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a cache backed by [`ShardedStorage`] with a custom clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_storage(
            config,
            ShardedStorage::with_capacity(config.max_size()),
            clock,
        )
    }
}

impl<K, V, S> TtlCache<K, V, S>
where
    K: Hash + Eq + Clone + Ord + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + Debug,
    S: Storage<K, CacheEntry<V>>,
{
    /// Create a cache over an existing storage backend.
    pub fn with_storage(config: CacheConfig, storage: S, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(
            config,
            storage,
            Box::new(OldestInsertionEviction::new(config.max_size())),
            clock,
            Metrics::new(),
        )
    }

    pub(crate) fn with_parts(
        config: CacheConfig,
        storage: S,
        policy: Box<dyn EvictionPolicy<K>>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            policy,
            ttl: config.ttl(),
            clock,
            write_lock: Mutex::new(()),
            metrics,
            _value: PhantomData,
        }
    }

    /// Look up a fresh value.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let ttl = self.ttl;

        let found = self.storage.get_with(key, |entry| {
            if entry.is_expired(now, ttl) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match found {
            Some(Some(value)) => {
                self.metrics.record_cache_hit();
                Some(value)
            }
            Some(None) => {
                // A concurrent set may have refreshed the entry since the read.
                if self
                    .storage
                    .remove_if(key, |entry| entry.is_expired(now, ttl))
                    .is_some()
                {
                    self.metrics.record_cache_expiration();
                    debug!(key = ?key, "cache entry expired");
                }
                self.metrics.record_cache_miss();
                None
            }
            None => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Store `value` under `key`, stamped with the current time.
    ///
    /// If the cache is full before the write, exactly one entry is evicted
    /// first, whether or not `key` is already present. When the key being
    /// replaced is itself the oldest entry, it is the one evicted.
    pub fn set(&self, key: K, value: V) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if self.policy.should_evict(self.storage.len()) {
            self.evict_one();
        }

        self.storage.insert(key, CacheEntry::new(value, now));
    }

    /// Remove the policy's victim. Caller holds the write lock.
    fn evict_one(&self) -> Option<K> {
        let mut candidates = Vec::with_capacity(self.storage.len());
        self.storage.for_each(|key, entry| {
            candidates.push(EvictionCandidate {
                key: key.clone(),
                inserted_at: entry.inserted_at,
            });
        });

        let victim = self.policy.select_victim(&candidates)?;
        self.storage.remove(&victim)?;
        self.metrics.record_cache_eviction();
        debug!(key = ?victim, "cache entry evicted");
        Some(victim)
    }

    /// Remove a single key, returning its value if present and fresh.
    pub fn remove(&self, key: &K) -> Option<V> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        self.storage
            .remove(key)
            .filter(|entry| !entry.is_expired(now, self.ttl))
            .map(|entry| entry.value)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.clear();
    }

    /// Remove every stale entry now, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.storage.len();
        self.storage.retain(|_, entry| !entry.is_expired(now, ttl));
        let purged = before.saturating_sub(self.storage.len());
        for _ in 0..purged {
            self.metrics.record_cache_expiration();
        }
        purged
    }

    /// Check for a fresh entry without counting a hit or miss.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.storage
            .get_with(key, |entry| !entry.is_expired(now, self.ttl))
            .unwrap_or(false)
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.policy.capacity()
    }

    /// Time-to-live of each entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Metrics for this cache.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl<K, V, S> Debug for TtlCache<K, V, S>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: Storage<K, CacheEntry<V>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.storage.len())
            .field("capacity", &self.policy.capacity())
            .field("ttl", &self.ttl)
            .finish()
    }
}
