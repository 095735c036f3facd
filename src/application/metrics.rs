//! Observability metrics for the governor.
//!
//! Counters are shared between the cache, limiter, gauge and governor that
//! make up one governor instance, so a single snapshot describes all of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for governor activity.
///
/// All counters use relaxed atomics. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_expirations: AtomicU64,
    cache_evictions: AtomicU64,
    requests_proceeded: AtomicU64,
    requests_throttled: AtomicU64,
    wait_rounds: AtomicU64,
    forced_admissions: AtomicU64,
    retries: AtomicU64,
    aborts: AtomicU64,
    sampling_failures: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $read:ident) => {
        pub(crate) fn $record(&self) {
            self.inner.$read.fetch_add(1, Ordering::Relaxed);
        }

        #[doc = concat!("Current value of `", stringify!($read), "`.")]
        pub fn $read(&self) -> u64 {
            self.inner.$read.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    counter!(record_cache_hit, cache_hits);
    counter!(record_cache_miss, cache_misses);
    counter!(record_cache_expiration, cache_expirations);
    counter!(record_cache_eviction, cache_evictions);
    counter!(record_proceeded, requests_proceeded);
    counter!(record_throttled, requests_throttled);
    counter!(record_wait_round, wait_rounds);
    counter!(record_forced_admission, forced_admissions);
    counter!(record_retry, retries);
    counter!(record_abort, aborts);
    counter!(record_sampling_failure, sampling_failures);

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            cache_expirations: self.cache_expirations(),
            cache_evictions: self.cache_evictions(),
            requests_proceeded: self.requests_proceeded(),
            requests_throttled: self.requests_throttled(),
            wait_rounds: self.wait_rounds(),
            forced_admissions: self.forced_admissions(),
            retries: self.retries(),
            aborts: self.aborts(),
            sampling_failures: self.sampling_failures(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.cache_hits,
            &inner.cache_misses,
            &inner.cache_expirations,
            &inner.cache_evictions,
            &inner.requests_proceeded,
            &inner.requests_throttled,
            &inner.wait_rounds,
            &inner.forced_admissions,
            &inner.retries,
            &inner.aborts,
            &inner.sampling_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Lookups answered from a fresh entry
    pub cache_hits: u64,
    /// Lookups that found nothing usable
    pub cache_misses: u64,
    /// Entries removed because their TTL elapsed
    pub cache_expirations: u64,
    /// Entries removed to make room for new ones
    pub cache_evictions: u64,
    /// Decisions that told the caller to fetch
    pub requests_proceeded: u64,
    /// Decisions that refused a fetch due to resource pressure
    pub requests_throttled: u64,
    /// Times a caller slept waiting for a window slot
    pub wait_rounds: u64,
    /// Admissions granted after the wait-round cap was hit
    pub forced_admissions: u64,
    /// Failures classified as transient
    pub retries: u64,
    /// Failures classified as permanent
    pub aborts: u64,
    /// Resource samples that could not be read
    pub sampling_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that hit (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_lookups();
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Total cache lookups (hits + misses).
    pub fn cache_lookups(&self) -> u64 {
        self.cache_hits.saturating_add(self.cache_misses)
    }

    /// Total decisions handed out (cache hits, proceeds and throttles).
    pub fn total_decisions(&self) -> u64 {
        self.cache_hits
            .saturating_add(self.requests_proceeded)
            .saturating_add(self.requests_throttled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_expiration();
        metrics.record_proceeded();
        metrics.record_throttled();
        metrics.record_wait_round();
        metrics.record_forced_admission();
        metrics.record_retry();
        metrics.record_abort();
        metrics.record_sampling_failure();
        metrics.record_cache_eviction();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.cache_expirations, 1);
        assert_eq!(snapshot.cache_evictions, 1);
        assert_eq!(snapshot.requests_proceeded, 1);
        assert_eq!(snapshot.requests_throttled, 1);
        assert_eq!(snapshot.wait_rounds, 1);
        assert_eq!(snapshot.forced_admissions, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.aborts, 1);
        assert_eq!(snapshot.sampling_failures, 1);
        assert_eq!(snapshot.total_decisions(), 3);
    }

    #[test]
    fn test_hit_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().hit_rate(), 0.0);

        metrics.record_cache_miss();
        assert_eq!(metrics.snapshot().hit_rate(), 0.0);

        metrics.record_cache_hit();
        assert!((metrics.snapshot().hit_rate() - 0.5).abs() < f64::EPSILON);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        assert!((metrics.snapshot().hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(metrics.snapshot().cache_lookups(), 4);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_retry();
        metrics.record_forced_admission();

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_clone_shares_counters() {
        let metrics1 = Metrics::new();
        metrics1.record_proceeded();

        let metrics2 = metrics1.clone();
        metrics2.record_proceeded();

        assert_eq!(metrics1.requests_proceeded(), 2);
        assert_eq!(metrics2.requests_proceeded(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = Metrics::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_cache_hit();
                    m.record_cache_miss();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.cache_hits(), 1000);
        assert_eq!(metrics.cache_misses(), 1000);
    }
}
