//! Sliding time window of admitted requests.
//!
//! The window stores the instants at which requests were admitted, oldest
//! first. A timestamp ages out once it is `window` or more in the past, so
//! every stored timestamp `t` satisfies `now - window < t <= now` after a call
//! to [`RateWindow::try_admit`].

use crate::domain::config::LimiterConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const PREALLOCATE_LIMIT: usize = 1024;

/// Outcome of asking the window for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// A slot was free and the request was recorded
    Admit,
    /// The window is full; a slot frees up after this duration
    Wait(Duration),
}

impl WindowDecision {
    /// Check if this decision is Admit.
    pub fn is_admit(&self) -> bool {
        matches!(self, WindowDecision::Admit)
    }

    /// The wait duration, if any.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            WindowDecision::Admit => None,
            WindowDecision::Wait(d) => Some(*d),
        }
    }
}

/// Admitted-request timestamps for one rolling window.
///
/// # Example
/// ```
/// use fetch_governor::{LimiterConfig, RateWindow, WindowDecision};
/// use std::time::{Duration, Instant};
///
/// let config = LimiterConfig::new(2, Duration::from_secs(60)).unwrap();
/// let mut window = RateWindow::new(&config);
/// let t0 = Instant::now();
///
/// assert_eq!(window.try_admit(t0), WindowDecision::Admit);
/// assert_eq!(window.try_admit(t0 + Duration::from_secs(1)), WindowDecision::Admit);
/// assert_eq!(
///     window.try_admit(t0 + Duration::from_secs(2)),
///     WindowDecision::Wait(Duration::from_secs(58))
/// );
/// assert_eq!(window.try_admit(t0 + Duration::from_secs(60)), WindowDecision::Admit);
/// ```
#[derive(Debug, Clone)]
pub struct RateWindow {
    max_requests: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Create an empty window from a validated configuration.
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            max_requests: config.max_requests(),
            window: config.window(),
            timestamps: VecDeque::with_capacity(config.max_requests().min(PREALLOCATE_LIMIT)),
        }
    }

    /// Drop timestamps that have aged out of the window ending at `now`.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a request at `now` if a slot is free, otherwise report the wait.
    pub fn try_admit(&mut self, now: Instant) -> WindowDecision {
        self.expire(now);

        if self.timestamps.len() < self.max_requests {
            self.timestamps.push_back(now);
            return WindowDecision::Admit;
        }

        let wait = self.wait_for_slot(now);
        if wait.is_zero() {
            // Only reachable if the clock moved backwards past the oldest entry.
            self.record(now);
            WindowDecision::Admit
        } else {
            WindowDecision::Wait(wait)
        }
    }

    /// Record a request at `now` regardless of occupancy.
    ///
    /// Used when the limiter gives up re-evaluating; the oldest entries are
    /// trimmed so the stored sequence stays bounded by `max_requests`.
    pub fn force_admit(&mut self, now: Instant) {
        self.expire(now);
        self.record(now);
    }

    fn record(&mut self, now: Instant) {
        while self.timestamps.len() >= self.max_requests {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(now);
    }

    /// Time until the oldest stored timestamp ages out, measured from `now`.
    ///
    /// Zero when a slot is already free.
    pub fn wait_for_slot(&self, now: Instant) -> Duration {
        if self.occupied_at(now) < self.max_requests {
            return Duration::ZERO;
        }
        self.timestamps
            .iter()
            .find(|&&t| now.saturating_duration_since(t) < self.window)
            .map(|&oldest| {
                self.window
                    .saturating_sub(now.saturating_duration_since(oldest))
            })
            .unwrap_or(Duration::ZERO)
    }

    /// Number of stored timestamps still inside the window ending at `now`.
    pub fn occupied_at(&self, now: Instant) -> usize {
        self.timestamps
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }

    /// Number of stored timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Stored timestamps, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = &Instant> {
        self.timestamps.iter()
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Forget every recorded request.
    pub fn reset(&mut self) {
        self.timestamps.clear();
    }
}
