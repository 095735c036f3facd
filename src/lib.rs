//! # fetch-governor
//!
//! Resource-aware request governor for scrapers and other outbound fetchers.
//!
//! For every candidate fetch the governor answers one question: fetch now,
//! serve a cached payload, or back off. It combines four parts:
//!
//! - a **sliding-window rate limiter** admitting at most N requests per
//!   rolling window, suspending callers until a slot frees up
//! - a **TTL cache** with lazy expiry and eviction of the oldest insertion
//! - a **resource gauge** that throttles when process memory or CPU exceeds
//!   a budget, and fails open when usage cannot be read
//! - an **error classifier** that splits fetch failures into transient
//!   (retry) and permanent (abort)
//!
//! The governor never performs the fetch itself. The caller fetches between
//! [`RequestGovernor::decide`] and [`RequestGovernor::report_outcome`], or
//! hands both steps to a [`FetchDriver`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetch_governor::{FetchOutcome, GovernorDecision, RequestGovernor, RequestKey};
//! use std::time::Duration;
//!
//! # async fn fetch(_url: &str) -> Result<Vec<u8>, std::io::Error> { Ok(Vec::new()) }
//! # #[tokio::main]
//! # async fn main() {
//! let governor = RequestGovernor::<Vec<u8>>::builder()
//!     .with_rate_limit(10, Duration::from_secs(60))
//!     .with_cache(1000, Duration::from_secs(300))
//!     .with_resource_budget(500 * 1024 * 1024, 80.0)
//!     .build()
//!     .unwrap();
//!
//! let key = RequestKey::new("https://example.com/matches/live");
//! match governor.decide(&key).await {
//!     GovernorDecision::ServeFromCache(body) => println!("cached: {} bytes", body.len()),
//!     GovernorDecision::Proceed => {
//!         let result = fetch(key.as_str()).await;
//!         governor.report_outcome(&key, FetchOutcome::from_result(result));
//!     }
//!     GovernorDecision::Throttled => println!("over budget, try later"),
//!     GovernorDecision::Wait(d) => println!("ask again in {:?}", d),
//! }
//! # }
//! ```
//!
//! ## Order of checks
//!
//! 1. **Cache**: a fresh entry is returned without touching the limiter.
//! 2. **Rate window**: the only step that may suspend the caller.
//! 3. **Resource budget**: over budget yields `Throttled`. The window slot
//!    taken in step 2 is not returned.
//!
//! ## Failure model
//!
//! Nothing fails for expected conditions. A full window is a delay, resource
//! pressure is a `Throttled` decision, and an unreadable usage sample counts
//! as within budget. Only invalid configuration is an error, reported when
//! the governor is built.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.
//! Decisions are logged at `DEBUG`; transient failures, throttling, sampling
//! failures and forced admissions at `WARN`; permanent failures at `ERROR`.
//!
//! ## Testing
//!
//! With the `test-helpers` feature, `infrastructure::mocks` provides a manual
//! clock, a scripted resource sampler and a log-capture layer. For code paths
//! that sleep, prefer a paused tokio runtime with [`TokioClock`].

// Domain layer - pure logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    classify::{ErrorClassifier, ErrorOutcome, DEFAULT_RETRY_KEYWORDS},
    config::{CacheConfig, ConfigError, GovernorConfig, LimiterConfig},
    decision::{FetchOutcome, GovernorDecision, RequestPhase, Settlement},
    key::RequestKey,
    resources::{ResourceBudget, ResourceCheck, ResourceSample, ResourceUsage},
    window::{RateWindow, WindowDecision},
};

pub use application::{
    cache::{CacheEntry, TtlCache},
    driver::{Backoff, DriveError, FetchDriver, Fetched, Fetcher, RetryPolicy},
    gauge::ResourceGauge,
    governor::{BuildError, RequestGovernor, RequestGovernorBuilder},
    limiter::{AcquireTimeout, Admission, SlidingWindowLimiter},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, EvictionCandidate, EvictionPolicy, ResourceSampler, SampleError, Storage},
};

pub use infrastructure::{
    clock::{SystemClock, TokioClock},
    eviction::OldestInsertionEviction,
    procfs::ProcSampler,
    storage::ShardedStorage,
};
