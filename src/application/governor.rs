//! Request governor: decides, per request key, whether to fetch now, serve a
//! cached payload, or back off.
//!
//! The order of checks is fixed: cache, then rate window, then resource
//! budget. Only the rate check can suspend the caller. A request that passes
//! the rate check but is then throttled has still consumed its window slot.
//!
//! # Example
//!
//! ```
//! use fetch_governor::{FetchOutcome, GovernorDecision, RequestGovernor, RequestKey, Settlement};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let governor = RequestGovernor::<Vec<u8>>::builder()
//!     .with_rate_limit(10, Duration::from_secs(60))
//!     .with_resource_budget(u64::MAX, 1_000_000.0)
//!     .build()
//!     .unwrap();
//!
//! let key = RequestKey::new("https://example.com/matches/live");
//! assert_eq!(governor.decide(&key).await, GovernorDecision::Proceed);
//!
//! let settled = governor.report_outcome(&key, FetchOutcome::Success(b"<html/>".to_vec()));
//! assert_eq!(settled, Settlement::Cached);
//!
//! assert!(governor.decide(&key).await.is_cached());
//! # }
//! ```

use crate::application::cache::TtlCache;
use crate::application::gauge::ResourceGauge;
use crate::application::limiter::{AcquireTimeout, SlidingWindowLimiter};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, ResourceSampler};
use crate::domain::classify::{ErrorClassifier, ErrorOutcome};
use crate::domain::config::{
    CacheConfig, ConfigError, GovernorConfig, LimiterConfig, DEFAULT_MAX_WAIT_ROUNDS,
};
use crate::domain::decision::{FetchOutcome, GovernorDecision, RequestPhase, Settlement};
use crate::domain::key::RequestKey;
use crate::domain::resources::ResourceBudget;
use crate::domain::window::WindowDecision;
use crate::infrastructure::clock::TokioClock;
use crate::infrastructure::eviction::OldestInsertionEviction;
use crate::infrastructure::procfs::ProcSampler;
use crate::infrastructure::storage::ShardedStorage;
use dashmap::DashMap;
use std::error::Error;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const PREALLOCATE_LIMIT: usize = 4096;

/// Error returned when building a governor fails.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A configuration value was invalid
    Config(ConfigError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config(e) => write!(f, "invalid governor configuration: {}", e),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::Config(e) => Some(e),
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::Config(e)
    }
}

/// Composes the cache, limiter, gauge and classifier for one process.
///
/// `V` is the payload type stored in the cache.
pub struct RequestGovernor<V>
where
    V: Clone + Send + Sync + Debug,
{
    cache: TtlCache<RequestKey, V>,
    limiter: SlidingWindowLimiter,
    gauge: ResourceGauge,
    classifier: ErrorClassifier,
    phases: DashMap<RequestKey, RequestPhase>,
    metrics: Metrics,
}

/// Records the phase of one `decide` call and clears it if the call ends
/// without a `Proceed`, including when the future is dropped mid-wait.
struct PhaseTracker<'a> {
    phases: &'a DashMap<RequestKey, RequestPhase>,
    key: &'a RequestKey,
    committed: bool,
}

impl<'a> PhaseTracker<'a> {
    fn start(phases: &'a DashMap<RequestKey, RequestPhase>, key: &'a RequestKey) -> Self {
        let tracker = Self {
            phases,
            key,
            committed: false,
        };
        tracker.enter(RequestPhase::CacheCheck);
        tracker
    }

    /// An earlier `Proceed` for the same key stays visible until reported.
    fn enter(&self, phase: RequestPhase) {
        self.phases
            .entry(self.key.clone())
            .and_modify(|current| {
                if *current != RequestPhase::InFlight {
                    *current = phase;
                }
            })
            .or_insert(phase);
    }

    fn commit(mut self) {
        self.phases.insert(self.key.clone(), RequestPhase::InFlight);
        self.committed = true;
    }
}

impl Drop for PhaseTracker<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.phases
                .remove_if(self.key, |_, phase| *phase != RequestPhase::InFlight);
        }
    }
}

impl<V> RequestGovernor<V>
where
    V: Clone + Send + Sync + Debug,
{
    /// Create a builder with the default configuration.
    pub fn builder() -> RequestGovernorBuilder<V> {
        RequestGovernorBuilder::new()
    }

    /// Build a governor from a flat configuration using the default clock
    /// and process sampler.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn from_config(config: &GovernorConfig) -> Result<Self, BuildError> {
        RequestGovernorBuilder::from_config(config).build()
    }

    /// Decide what to do with `key`, waiting for a rate window slot if needed.
    ///
    /// Never returns [`GovernorDecision::Wait`]; the wait happens inside.
    pub async fn decide(&self, key: &RequestKey) -> GovernorDecision<V> {
        let tracker = PhaseTracker::start(&self.phases, key);
        if let Some(value) = self.check_cache(key) {
            return GovernorDecision::ServeFromCache(value);
        }

        tracker.enter(RequestPhase::RateCheck);
        let admission = self.limiter.acquire().await;
        if admission.rounds > 0 {
            debug!(
                key = %key,
                id = %key.short_id(),
                rounds = admission.rounds,
                waited_ms = admission.waited.as_millis() as u64,
                "admitted after waiting"
            );
        }

        self.check_resources(key, tracker)
    }

    /// Like [`decide`](Self::decide), but give up waiting after `timeout`.
    ///
    /// # Errors
    /// Returns `AcquireTimeout` if no window slot opened in time. Nothing is
    /// recorded in the window in that case.
    pub async fn decide_with_timeout(
        &self,
        key: &RequestKey,
        timeout: Duration,
    ) -> Result<GovernorDecision<V>, AcquireTimeout> {
        let tracker = PhaseTracker::start(&self.phases, key);
        if let Some(value) = self.check_cache(key) {
            return Ok(GovernorDecision::ServeFromCache(value));
        }

        tracker.enter(RequestPhase::RateCheck);
        self.limiter.acquire_timeout(timeout).await?;
        Ok(self.check_resources(key, tracker))
    }

    /// Decide without suspending.
    ///
    /// Returns [`GovernorDecision::Wait`] when the rate window is full; the
    /// caller should ask again after the given duration.
    pub fn try_decide(&self, key: &RequestKey) -> GovernorDecision<V> {
        let tracker = PhaseTracker::start(&self.phases, key);
        if let Some(value) = self.check_cache(key) {
            return GovernorDecision::ServeFromCache(value);
        }

        tracker.enter(RequestPhase::RateCheck);
        if let WindowDecision::Wait(wait) = self.limiter.try_acquire() {
            debug!(key = %key, wait_ms = wait.as_millis() as u64, "rate window full");
            return GovernorDecision::Wait(wait);
        }

        self.check_resources(key, tracker)
    }

    fn check_cache(&self, key: &RequestKey) -> Option<V> {
        let value = self.cache.get(key)?;
        debug!(key = %key, id = %key.short_id(), "serving from cache");
        Some(value)
    }

    fn check_resources(&self, key: &RequestKey, tracker: PhaseTracker<'_>) -> GovernorDecision<V> {
        tracker.enter(RequestPhase::ResourceCheck);
        if self.gauge.is_over_budget() {
            self.metrics.record_throttled();
            warn!(key = %key, id = %key.short_id(), "over resource budget, throttling");
            return GovernorDecision::Throttled;
        }

        tracker.commit();
        self.metrics.record_proceeded();
        debug!(key = %key, id = %key.short_id(), "proceeding with fetch");
        GovernorDecision::Proceed
    }

    /// Settle a fetch for `key`.
    ///
    /// Successful payloads are cached. Failures are classified: `Retry` means
    /// the caller may call [`decide`](Self::decide) again within its own retry
    /// bound, `Abort` means the failure should be surfaced.
    pub fn report_outcome(&self, key: &RequestKey, outcome: FetchOutcome<V>) -> Settlement {
        match outcome {
            FetchOutcome::Success(value) => {
                self.report_success(key, value);
                Settlement::Cached
            }
            FetchOutcome::Failure(description) => self.report_failure(key, &description).into(),
        }
    }

    /// Cache a successful payload and settle `key`.
    pub fn report_success(&self, key: &RequestKey, value: V) {
        self.phases.remove(key);
        self.cache.set(key.clone(), value);
        debug!(
            key = %key,
            phase = %RequestPhase::SettledSuccess,
            "fetch succeeded, payload cached"
        );
    }

    /// Classify a failure described by `description` and settle `key`.
    pub fn report_failure(&self, key: &RequestKey, description: &str) -> ErrorOutcome {
        let outcome = self.classifier.classify(description);
        self.settle_failure(key, outcome, &description);
        outcome
    }

    /// Classify a failure from an error value and its source chain, and
    /// settle `key`.
    pub fn report_error(&self, key: &RequestKey, err: &(dyn Error + 'static)) -> ErrorOutcome {
        let outcome = self.classifier.classify_error(err);
        self.settle_failure(key, outcome, &err);
        outcome
    }

    fn settle_failure(&self, key: &RequestKey, outcome: ErrorOutcome, err: &dyn fmt::Display) {
        self.phases.remove(key);
        match outcome {
            ErrorOutcome::Retry => {
                self.metrics.record_retry();
                warn!(
                    key = %key,
                    phase = %RequestPhase::SettledFailure,
                    error = %err,
                    "transient fetch failure, retry allowed"
                );
            }
            ErrorOutcome::Abort => {
                self.metrics.record_abort();
                error!(
                    key = %key,
                    phase = %RequestPhase::SettledFailure,
                    error = %err,
                    "permanent fetch failure"
                );
            }
        }
    }

    /// Current phase of `key`; `Idle` if it is neither being decided nor in flight.
    pub fn phase(&self, key: &RequestKey) -> RequestPhase {
        self.phases
            .get(key)
            .map(|entry| *entry.value())
            .unwrap_or(RequestPhase::Idle)
    }

    /// Number of keys that received `Proceed` and have not been reported.
    pub fn in_flight(&self) -> usize {
        self.phases
            .iter()
            .filter(|entry| *entry.value() == RequestPhase::InFlight)
            .count()
    }

    /// The payload cache.
    pub fn cache(&self) -> &TtlCache<RequestKey, V> {
        &self.cache
    }

    /// The rate limiter.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// The resource gauge.
    pub fn gauge(&self) -> &ResourceGauge {
        &self.gauge
    }

    /// The error classifier.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Metrics shared by every component of this governor.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl<V> Debug for RequestGovernor<V>
where
    V: Clone + Send + Sync + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGovernor")
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("gauge", &self.gauge)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Builder for constructing a [`RequestGovernor`].
///
/// Values are validated when [`build`](Self::build) is called.
pub struct RequestGovernorBuilder<V> {
    max_requests: usize,
    window: Duration,
    max_wait_rounds: u32,
    cache_capacity: usize,
    cache_ttl: Duration,
    max_memory_bytes: u64,
    max_cpu_percent: f64,
    retry_keywords: Vec<String>,
    clock: Option<Arc<dyn Clock>>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    _payload: std::marker::PhantomData<fn() -> V>,
}

impl<V> RequestGovernorBuilder<V>
where
    V: Clone + Send + Sync + Debug,
{
    /// Builder with the default configuration.
    pub fn new() -> Self {
        let limiter = LimiterConfig::default();
        let cache = CacheConfig::default();
        let budget = ResourceBudget::default();
        Self {
            max_requests: limiter.max_requests(),
            window: limiter.window(),
            max_wait_rounds: DEFAULT_MAX_WAIT_ROUNDS,
            cache_capacity: cache.max_size(),
            cache_ttl: cache.ttl(),
            max_memory_bytes: budget.max_memory_bytes(),
            max_cpu_percent: budget.max_cpu_percent(),
            retry_keywords: Vec::new(),
            clock: None,
            sampler: None,
            _payload: std::marker::PhantomData,
        }
    }

    /// Builder seeded from a flat configuration.
    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new()
            .with_rate_limit(config.max_requests, Duration::from_secs(config.window_secs))
            .with_max_wait_rounds(config.max_wait_rounds)
            .with_cache(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            )
            .with_resource_budget(
                config.max_memory_mb.saturating_mul(1024 * 1024),
                config.max_cpu_percent,
            )
            .with_retry_keywords(config.extra_retry_keywords.iter())
    }

    /// Admit at most `max_requests` per rolling `window`.
    ///
    /// Default: 10 per 60 seconds
    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.max_requests = max_requests;
        self.window = window;
        self
    }

    /// Cap the sleep-and-recheck rounds of one wait.
    ///
    /// Default: 32
    pub fn with_max_wait_rounds(mut self, rounds: u32) -> Self {
        self.max_wait_rounds = rounds;
        self
    }

    /// Cache at most `capacity` payloads for `ttl` each.
    ///
    /// Default: 1000 entries, 300 seconds
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }

    /// Throttle when resident memory or CPU exceeds these ceilings.
    ///
    /// Default: 500 MiB, 80 %
    pub fn with_resource_budget(mut self, max_memory_bytes: u64, max_cpu_percent: f64) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self.max_cpu_percent = max_cpu_percent;
        self
    }

    /// Treat errors containing any of these keywords as transient, in
    /// addition to the defaults.
    pub fn with_retry_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.retry_keywords
            .extend(keywords.into_iter().map(|k| k.as_ref().to_string()));
        self
    }

    /// Set a custom clock (mainly for testing).
    ///
    /// Default: [`TokioClock`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a custom resource sampler.
    ///
    /// Default: [`ProcSampler`]
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Build the governor.
    ///
    /// # Errors
    /// Returns `BuildError` if any configured value is invalid.
    pub fn build(self) -> Result<RequestGovernor<V>, BuildError> {
        let limiter_config = LimiterConfig::new(self.max_requests, self.window)?
            .with_max_wait_rounds(self.max_wait_rounds)?;
        let cache_config = CacheConfig::new(self.cache_capacity, self.cache_ttl)?;
        let budget = ResourceBudget::new(self.max_memory_bytes, self.max_cpu_percent)?;

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::new()));
        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(ProcSampler::with_clock(Arc::clone(&clock))));

        let cache = TtlCache::with_parts(
            cache_config,
            ShardedStorage::with_capacity(cache_config.max_size().min(PREALLOCATE_LIMIT)),
            Box::new(OldestInsertionEviction::new(cache_config.max_size())),
            Arc::clone(&clock),
            metrics.clone(),
        );
        let limiter =
            SlidingWindowLimiter::with_metrics(limiter_config, Arc::clone(&clock), metrics.clone());
        let gauge = ResourceGauge::with_parts(budget, sampler, clock, metrics.clone());
        let classifier = ErrorClassifier::new().with_keywords(&self.retry_keywords);

        Ok(RequestGovernor {
            cache,
            limiter,
            gauge,
            classifier,
            phases: DashMap::new(),
            metrics,
        })
    }
}

impl<V> Default for RequestGovernorBuilder<V>
where
    V: Clone + Send + Sync + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
