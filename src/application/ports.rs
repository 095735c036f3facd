//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::resources::ResourceUsage;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::io;
use std::time::Instant;

/// Port for obtaining current time.
///
/// Infrastructure provides concrete implementations (SystemClock, TokioClock,
/// MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Candidate entry for eviction consideration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// When the entry was inserted
    pub inserted_at: Instant,
}

/// Port for eviction policy decisions.
///
/// The cache asks the policy whether it is full and, if so, which entry to
/// drop. Infrastructure provides [`OldestInsertionEviction`].
///
/// [`OldestInsertionEviction`]: crate::infrastructure::eviction::OldestInsertionEviction
pub trait EvictionPolicy<K>: Send + Sync + Debug
where
    K: Clone,
{
    /// Select a victim from the given candidates.
    ///
    /// # Returns
    /// The key of the entry to evict, or None if `candidates` is empty
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K>;

    /// Check if the storage is full before inserting a new entry.
    fn should_evict(&self, current_entries: usize) -> bool;

    /// The entry count this policy keeps the storage at or below.
    fn capacity(&self) -> usize;
}

/// Port for concurrent key-value storage.
///
/// Every method is atomic with respect to other calls on the same key.
/// Infrastructure provides [`ShardedStorage`].
///
/// [`ShardedStorage`]: crate::infrastructure::storage::ShardedStorage
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Run `reader` against the value for `key`, if present.
    fn get_with<R>(&self, key: &K, reader: impl FnOnce(&V) -> R) -> Option<R>;

    /// Insert a value, returning the previous one.
    fn insert(&self, key: K, value: V) -> Option<V>;

    /// Check if a key is present.
    fn contains_key(&self, key: &K) -> bool;

    /// Remove a key, returning its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Remove a key only if `predicate` holds for its current value.
    fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<V>;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Error returned when process usage cannot be read.
#[derive(Debug)]
pub enum SampleError {
    /// The platform offers no way to read usage
    Unsupported,
    /// Reading the usage source failed
    Io(io::Error),
    /// The usage source had an unexpected format
    Parse(String),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::Unsupported => write!(f, "resource sampling is not supported here"),
            SampleError::Io(e) => write!(f, "failed to read resource usage: {}", e),
            SampleError::Parse(msg) => write!(f, "malformed resource usage: {}", msg),
        }
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SampleError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SampleError {
    fn from(e: io::Error) -> Self {
        SampleError::Io(e)
    }
}

/// Port for reading the current process's resource usage.
///
/// Implementations must return an error rather than panic when usage cannot
/// be read; the gauge treats errors as "within budget".
pub trait ResourceSampler: Send + Sync + Debug {
    /// Read current memory and CPU usage.
    fn sample(&self) -> Result<ResourceUsage, SampleError>;
}
