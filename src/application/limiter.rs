//! Sliding-window rate limiter.
//!
//! The limiter admits at most `max_requests` per rolling window. Callers that
//! find the window full are suspended until the oldest admission ages out and
//! then re-evaluate, in arrival order.

use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::config::LimiterConfig;
use crate::domain::window::{RateWindow, WindowDecision};
use crate::infrastructure::clock::TokioClock;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a completed [`SlidingWindowLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Number of times the caller slept before being admitted
    pub rounds: u32,
    /// Total time spent sleeping
    pub waited: Duration,
    /// True if the caller was admitted after the round cap without a free slot
    pub forced: bool,
}

impl Admission {
    fn immediate() -> Self {
        Self {
            rounds: 0,
            waited: Duration::ZERO,
            forced: false,
        }
    }
}

/// Error returned when [`SlidingWindowLimiter::acquire_timeout`] runs out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireTimeout {
    /// The deadline that elapsed
    pub timeout: Duration,
}

impl fmt::Display for AcquireTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no rate window slot within {:?}", self.timeout)
    }
}

impl std::error::Error for AcquireTimeout {}

/// Rate limiter over a single shared [`RateWindow`].
///
/// The window is guarded by a synchronous mutex that is never held across an
/// await point. Suspended callers queue on an async mutex, so they are woken
/// and admitted in the order they arrived.
///
/// Dropping an `acquire` future while it sleeps leaves the window untouched:
/// a timestamp is only recorded at the moment of admission.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Mutex<RateWindow>,
    turnstile: tokio::sync::Mutex<()>,
    clock: Arc<dyn Clock>,
    max_wait_rounds: u32,
    metrics: Metrics,
}

impl SlidingWindowLimiter {
    /// Create a limiter reading time from tokio's clock.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock::new()))
    }

    /// Create a limiter with a custom clock.
    ///
    /// Sleeps always use tokio's timer, so the clock should move with it
    /// (see [`TokioClock`]). A clock that stands still makes every wait
    /// end in a forced admission once the round cap is reached.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_metrics(config, clock, Metrics::new())
    }

    pub(crate) fn with_metrics(
        config: LimiterConfig,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            window: Mutex::new(RateWindow::new(&config)),
            turnstile: tokio::sync::Mutex::new(()),
            clock,
            max_wait_rounds: config.max_wait_rounds(),
            metrics,
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot if one is free, without suspending.
    ///
    /// Does not queue behind suspended callers.
    pub fn try_acquire(&self) -> WindowDecision {
        let now = self.clock.now();
        self.lock_window().try_admit(now)
    }

    /// Wait until a slot is free and take it.
    ///
    /// Never fails. If the window is still full after `max_wait_rounds`
    /// sleeps, the caller is admitted anyway and a warning is logged.
    pub async fn acquire(&self) -> Admission {
        if let Ok(_turn) = self.turnstile.try_lock() {
            if self.try_acquire().is_admit() {
                return Admission::immediate();
            }
        }

        let _turn = self.turnstile.lock().await;
        let mut admission = Admission::immediate();

        loop {
            let wait = match self.try_acquire() {
                WindowDecision::Admit => return admission,
                WindowDecision::Wait(wait) => wait,
            };

            if admission.rounds >= self.max_wait_rounds {
                let now = self.clock.now();
                self.lock_window().force_admit(now);
                self.metrics.record_forced_admission();
                warn!(
                    rounds = admission.rounds,
                    waited_ms = admission.waited.as_millis() as u64,
                    remaining_ms = wait.as_millis() as u64,
                    "rate window still full after wait cap, admitting"
                );
                admission.forced = true;
                return admission;
            }

            admission.rounds += 1;
            admission.waited += wait;
            self.metrics.record_wait_round();
            debug!(
                round = admission.rounds,
                wait_ms = wait.as_millis() as u64,
                "rate window full, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`.
    ///
    /// On timeout nothing has been recorded in the window.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Admission, AcquireTimeout> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| AcquireTimeout { timeout })
    }

    /// Time until a slot frees up; zero if one is free now.
    pub fn time_until_available(&self) -> Duration {
        let now = self.clock.now();
        self.lock_window().wait_for_slot(now)
    }

    /// Free slots in the window ending now.
    pub fn available(&self) -> usize {
        let now = self.clock.now();
        let window = self.lock_window();
        window.max_requests().saturating_sub(window.occupied_at(now))
    }

    /// Admission timestamps currently stored, oldest first.
    pub fn recorded(&self) -> Vec<Instant> {
        self.lock_window().timestamps().copied().collect()
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> usize {
        self.lock_window().max_requests()
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.lock_window().window()
    }

    /// Forget every recorded admission.
    pub fn reset(&self) {
        self.lock_window().reset();
    }

    /// Metrics for this limiter.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn config(max: usize, secs: u64) -> LimiterConfig {
        LimiterConfig::new(max, Duration::from_secs(secs)).unwrap()
    }

    #[test]
    fn test_try_acquire_with_mock_clock() {
        let clock = Arc::new(MockClock::starting_now());
        let limiter = SlidingWindowLimiter::with_clock(config(2, 60), clock.clone());

        assert!(limiter.try_acquire().is_admit());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire().is_admit());
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            limiter.try_acquire(),
            WindowDecision::Wait(Duration::from_secs(58))
        );
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.time_until_available(), Duration::from_secs(58));

        clock.advance(Duration::from_secs(58));
        assert_eq!(limiter.available(), 1);
        assert!(limiter.try_acquire().is_admit());
        assert_eq!(limiter.recorded().len(), 2);
    }

    #[test]
    fn test_reset() {
        let limiter = SlidingWindowLimiter::with_clock(
            config(1, 60),
            Arc::new(MockClock::starting_now()),
        );
        assert!(limiter.try_acquire().is_admit());
        assert!(!limiter.try_acquire().is_admit());

        limiter.reset();
        assert!(limiter.try_acquire().is_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_oldest_to_expire() {
        let clock = Arc::new(TokioClock::new());
        let limiter = SlidingWindowLimiter::with_clock(config(2, 60), clock.clone());
        let start = clock.now();

        assert_eq!(limiter.acquire().await, Admission::immediate());
        tokio::time::advance(Duration::from_secs(1)).await;
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(1)).await;

        let admission = limiter.acquire().await;
        assert_eq!(admission.rounds, 1);
        assert_eq!(admission.waited, Duration::from_secs(58));
        assert!(!admission.forced);
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(60));
        assert_eq!(limiter.metrics().wait_rounds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_window_untouched() {
        let limiter = SlidingWindowLimiter::new(config(1, 60));
        limiter.acquire().await;

        let result = limiter.acquire_timeout(Duration::from_secs(10)).await;
        assert_eq!(
            result,
            Err(AcquireTimeout {
                timeout: Duration::from_secs(10)
            })
        );
        assert_eq!(limiter.recorded().len(), 1);

        // The cancelled waiter released its place in the queue.
        let admission = limiter
            .acquire_timeout(Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(admission.waited, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_clock_forces_admission_after_cap() {
        let clock = Arc::new(MockClock::starting_now());
        let limiter = SlidingWindowLimiter::with_clock(
            config(1, 60).with_max_wait_rounds(3).unwrap(),
            clock,
        );
        limiter.acquire().await;

        let admission = limiter.acquire().await;
        assert!(admission.forced);
        assert_eq!(admission.rounds, 3);
        assert_eq!(limiter.metrics().forced_admissions(), 1);
        // Forced admission still keeps the window bounded.
        assert_eq!(limiter.recorded().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_admitted_in_arrival_order() {
        let limiter = Arc::new(SlidingWindowLimiter::new(config(1, 10)));
        limiter.acquire().await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().unwrap().push(i);
            }));
            // Let each task reach the queue before spawning the next.
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_acquire_timeout_display() {
        let err = AcquireTimeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "no rate window slot within 5s");
    }
}
