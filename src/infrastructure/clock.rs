//! Clock adapters for time operations.
//!
//! - [`SystemClock`] reads `Instant::now()` directly.
//! - [`TokioClock`] reads tokio's clock, which can be paused and advanced in
//!   tests so that the limiter's sleeps and its view of time move together.
//!
//! # Testing
//!
//! See `MockClock` (in `crate::infrastructure::mocks`) for a manually driven
//! clock, available with the `test-helpers` feature or in test builds.

use crate::application::ports::Clock;
use std::time::Instant;

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock backed by `tokio::time::Instant`.
///
/// Outside a paused test runtime this matches [`SystemClock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Create a new tokio clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now();

        assert!(t2 > t1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let t1 = clock.now();

        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(clock.now().duration_since(t1), Duration::from_secs(30));
    }
}
