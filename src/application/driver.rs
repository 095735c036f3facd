//! Caller-side fetch loop.
//!
//! The governor only decides and settles; retrying is the caller's job.
//! [`FetchDriver`] is that caller for the common case: it asks the governor,
//! performs the fetch through a [`Fetcher`], reports the outcome, and retries
//! transient failures within a [`RetryPolicy`].

use crate::application::governor::RequestGovernor;
use crate::domain::classify::ErrorOutcome;
use crate::domain::config::ConfigError;
use crate::domain::decision::GovernorDecision;
use crate::domain::key::RequestKey;
use std::error::Error;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Port for the network fetch performed between `decide` and `report`.
pub trait Fetcher<V>: Send + Sync {
    /// Error produced by a failed fetch.
    type Error: Error + Send + Sync + 'static;

    /// Fetch the payload for `key`.
    fn fetch(&self, key: &RequestKey) -> impl Future<Output = Result<V, Self::Error>> + Send;
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time
    Fixed(Duration),
    /// `base * 2^(n-1)` for the n-th delay, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the next try after `n` consecutive setbacks (`n >= 1`).
    pub fn delay(&self, n: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(n.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

/// Bounds on how long the driver keeps trying one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_throttle_waits: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Allow up to `max_attempts` fetches per key.
    ///
    /// # Errors
    /// Returns an error if `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        Ok(Self {
            max_attempts,
            ..Self::default()
        })
    }

    /// Use `backoff` between retries and between throttled decisions.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Give up after this many consecutive `Throttled` decisions.
    pub fn with_max_throttle_waits(mut self, waits: u32) -> Self {
        self.max_throttle_waits = waits;
        self
    }

    /// Maximum fetch attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Maximum consecutive throttled decisions.
    pub fn max_throttle_waits(&self) -> u32 {
        self.max_throttle_waits
    }

    /// Delay schedule.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_throttle_waits: 5,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        }
    }
}

/// Where a driven payload came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<V> {
    /// Served from the governor's cache
    Cached(V),
    /// Fetched over the network and now cached
    Fresh(V),
}

impl<V> Fetched<V> {
    /// The payload, wherever it came from.
    pub fn into_inner(self) -> V {
        match self {
            Fetched::Cached(v) | Fetched::Fresh(v) => v,
        }
    }

    /// Check if the payload came from the cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, Fetched::Cached(_))
    }
}

/// Why the driver gave up on a key.
#[derive(Debug)]
pub enum DriveError<E> {
    /// The fetch failed permanently
    Aborted(E),
    /// Every allowed attempt failed transiently
    RetriesExhausted { attempts: u32, last_error: E },
    /// The governor kept throttling
    Throttled { attempts: u32 },
}

impl<E: fmt::Display> fmt::Display for DriveError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveError::Aborted(e) => write!(f, "fetch aborted: {}", e),
            DriveError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "fetch failed after {} attempts: {}", attempts, last_error),
            DriveError::Throttled { attempts } => write!(
                f,
                "gave up while throttled for resource pressure ({} attempts made)",
                attempts
            ),
        }
    }
}

impl<E: Error + 'static> Error for DriveError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DriveError::Aborted(e) => Some(e),
            DriveError::RetriesExhausted { last_error, .. } => Some(last_error),
            DriveError::Throttled { .. } => None,
        }
    }
}

/// Runs decide, fetch and report for one key at a time.
#[derive(Debug)]
pub struct FetchDriver<V>
where
    V: Clone + Send + Sync + Debug,
{
    governor: Arc<RequestGovernor<V>>,
    policy: RetryPolicy,
}

impl<V> Clone for FetchDriver<V>
where
    V: Clone + Send + Sync + Debug,
{
    fn clone(&self) -> Self {
        Self {
            governor: Arc::clone(&self.governor),
            policy: self.policy,
        }
    }
}

impl<V> FetchDriver<V>
where
    V: Clone + Send + Sync + Debug,
{
    /// Create a driver over a shared governor.
    pub fn new(governor: Arc<RequestGovernor<V>>, policy: RetryPolicy) -> Self {
        Self { governor, policy }
    }

    /// Get `key`, from the cache if fresh, otherwise through `fetcher`.
    ///
    /// # Errors
    /// See [`DriveError`].
    pub async fn get<F>(
        &self,
        key: &RequestKey,
        fetcher: &F,
    ) -> Result<Fetched<V>, DriveError<F::Error>>
    where
        F: Fetcher<V>,
    {
        let mut attempts = 0u32;
        let mut throttled = 0u32;

        loop {
            match self.governor.decide(key).await {
                GovernorDecision::ServeFromCache(value) => return Ok(Fetched::Cached(value)),
                GovernorDecision::Wait(wait) => tokio::time::sleep(wait).await,
                GovernorDecision::Throttled => {
                    throttled += 1;
                    if throttled > self.policy.max_throttle_waits {
                        return Err(DriveError::Throttled { attempts });
                    }
                    let delay = self.policy.backoff.delay(throttled);
                    debug!(
                        key = %key,
                        throttled,
                        delay_ms = delay.as_millis() as u64,
                        "throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                GovernorDecision::Proceed => {
                    throttled = 0;
                    attempts += 1;
                    let err = match fetcher.fetch(key).await {
                        Ok(value) => {
                            self.governor.report_success(key, value.clone());
                            return Ok(Fetched::Fresh(value));
                        }
                        Err(err) => err,
                    };

                    if self.governor.report_error(key, &err) == ErrorOutcome::Abort {
                        return Err(DriveError::Aborted(err));
                    }
                    if attempts >= self.policy.max_attempts {
                        return Err(DriveError::RetriesExhausted {
                            attempts,
                            last_error: err,
                        });
                    }
                    let delay = self.policy.backoff.delay(attempts);
                    debug!(
                        key = %key,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// The governor this driver uses.
    pub fn governor(&self) -> &Arc<RequestGovernor<V>> {
        &self.governor
    }

    /// The retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
