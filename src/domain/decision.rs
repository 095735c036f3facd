//! Decisions handed to callers and the outcomes they report back.

use crate::domain::classify::ErrorOutcome;
use std::fmt;
use std::time::Duration;

/// What the caller should do with a candidate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernorDecision<V> {
    /// Perform the fetch now and report the outcome afterwards
    Proceed,
    /// The rate window is full; ask again after this duration
    Wait(Duration),
    /// A fresh cached payload exists; no fetch needed
    ServeFromCache(V),
    /// The process is over its resource budget; back off and retry later
    Throttled,
}

impl<V> GovernorDecision<V> {
    /// Check if this decision is Proceed.
    pub fn is_proceed(&self) -> bool {
        matches!(self, GovernorDecision::Proceed)
    }

    /// Check if this decision is Throttled.
    pub fn is_throttled(&self) -> bool {
        matches!(self, GovernorDecision::Throttled)
    }

    /// Check if this decision is a cache hit.
    pub fn is_cached(&self) -> bool {
        matches!(self, GovernorDecision::ServeFromCache(_))
    }

    /// The cached payload, if this decision carries one.
    pub fn cached(self) -> Option<V> {
        match self {
            GovernorDecision::ServeFromCache(v) => Some(v),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            GovernorDecision::Proceed => "proceed",
            GovernorDecision::Wait(_) => "wait",
            GovernorDecision::ServeFromCache(_) => "cache_hit",
            GovernorDecision::Throttled => "throttled",
        }
    }
}

/// Outcome of a fetch, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<V> {
    /// The fetch succeeded with this payload
    Success(V),
    /// The fetch failed with this description
    Failure(String),
}

impl<V> FetchOutcome<V> {
    /// Build an outcome from a `Result`, describing the error with `Display`.
    pub fn from_result<E: fmt::Display>(result: Result<V, E>) -> Self {
        match result {
            Ok(v) => FetchOutcome::Success(v),
            Err(e) => FetchOutcome::Failure(e.to_string()),
        }
    }
}

/// How the governor settled a reported outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The payload was stored in the cache
    Cached,
    /// The failure was transient; the caller may retry
    Retry,
    /// The failure was permanent; the caller must surface it
    Abort,
}

impl From<ErrorOutcome> for Settlement {
    fn from(outcome: ErrorOutcome) -> Self {
        match outcome {
            ErrorOutcome::Retry => Settlement::Retry,
            ErrorOutcome::Abort => Settlement::Abort,
        }
    }
}

/// Lifecycle of one logical request.
///
/// `Idle → CacheCheck → RateCheck → ResourceCheck → InFlight → Settled`.
/// Only `RateCheck` may suspend the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPhase {
    /// Not yet evaluated
    Idle,
    /// Looking up the cache
    CacheCheck,
    /// Waiting for a slot in the rate window
    RateCheck,
    /// Checking the resource budget
    ResourceCheck,
    /// Fetch performed by the caller, outcome not yet reported
    InFlight,
    /// Outcome reported successfully
    SettledSuccess,
    /// Outcome reported as a failure
    SettledFailure,
}

impl RequestPhase {
    /// Name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Idle => "idle",
            RequestPhase::CacheCheck => "cache_check",
            RequestPhase::RateCheck => "rate_check",
            RequestPhase::ResourceCheck => "resource_check",
            RequestPhase::InFlight => "in_flight",
            RequestPhase::SettledSuccess => "settled_success",
            RequestPhase::SettledFailure => "settled_failure",
        }
    }

    /// Check if the request has settled.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RequestPhase::SettledSuccess | RequestPhase::SettledFailure
        )
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_helpers() {
        let hit: GovernorDecision<u32> = GovernorDecision::ServeFromCache(7);
        assert!(hit.is_cached());
        assert_eq!(hit.label(), "cache_hit");
        assert_eq!(hit.cached(), Some(7));

        let proceed: GovernorDecision<u32> = GovernorDecision::Proceed;
        assert!(proceed.is_proceed());
        assert_eq!(proceed.cached(), None);

        let throttled: GovernorDecision<u32> = GovernorDecision::Throttled;
        assert!(throttled.is_throttled());
        assert_eq!(
            GovernorDecision::<u32>::Wait(Duration::from_secs(1)).label(),
            "wait"
        );
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<&str, String> = Ok("body");
        assert_eq!(FetchOutcome::from_result(ok), FetchOutcome::Success("body"));

        let err: Result<&str, String> = Err("dns failure".to_string());
        assert_eq!(
            FetchOutcome::from_result(err),
            FetchOutcome::Failure("dns failure".to_string())
        );
    }

    #[test]
    fn test_settlement_from_error_outcome() {
        assert_eq!(Settlement::from(ErrorOutcome::Retry), Settlement::Retry);
        assert_eq!(Settlement::from(ErrorOutcome::Abort), Settlement::Abort);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(RequestPhase::RateCheck.to_string(), "rate_check");
        assert!(RequestPhase::SettledFailure.is_settled());
        assert!(!RequestPhase::InFlight.is_settled());
    }
}
