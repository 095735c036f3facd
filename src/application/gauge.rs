//! Resource gauge: samples process usage and compares it to a budget.
//!
//! Sampling failures never reach the caller as errors from
//! [`ResourceGauge::is_over_budget`]; they are logged, counted, and treated
//! as within budget.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, ResourceSampler, SampleError};
use crate::domain::resources::{ResourceBudget, ResourceCheck, ResourceSample};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::procfs::ProcSampler;
use std::sync::Arc;
use tracing::warn;

/// Compares sampled process usage with a [`ResourceBudget`].
#[derive(Debug, Clone)]
pub struct ResourceGauge {
    sampler: Arc<dyn ResourceSampler>,
    budget: ResourceBudget,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl ResourceGauge {
    /// Gauge reading the current process through procfs.
    pub fn new(budget: ResourceBudget) -> Self {
        Self::with_sampler(budget, Arc::new(ProcSampler::new()))
    }

    /// Gauge over a custom sampler.
    pub fn with_sampler(budget: ResourceBudget, sampler: Arc<dyn ResourceSampler>) -> Self {
        Self::with_parts(budget, sampler, Arc::new(SystemClock::new()), Metrics::new())
    }

    pub(crate) fn with_parts(
        budget: ResourceBudget,
        sampler: Arc<dyn ResourceSampler>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            sampler,
            budget,
            clock,
            metrics,
        }
    }

    /// Take one sample.
    pub fn sample(&self) -> Result<ResourceSample, SampleError> {
        let usage = self.sampler.sample()?;
        Ok(ResourceSample::new(usage, self.clock.now()))
    }

    /// Sample and evaluate against the budget.
    ///
    /// Returns `None` if the sample could not be read.
    pub fn check(&self) -> Option<ResourceCheck> {
        match self.sample() {
            Ok(sample) => Some(self.budget.check(sample)),
            Err(e) => {
                self.metrics.record_sampling_failure();
                warn!(error = %e, "resource sampling failed, assuming within budget");
                None
            }
        }
    }

    /// True iff memory or CPU exceeds the budget. False if sampling fails.
    pub fn is_over_budget(&self) -> bool {
        self.check().map_or(false, |check| check.is_over_budget())
    }

    /// The configured budget.
    pub fn budget(&self) -> ResourceBudget {
        self.budget
    }

    /// Metrics for this gauge.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{MockCaptureLayer, MockSampler};
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    const MB: u64 = 1024 * 1024;

    fn gauge(sampler: &MockSampler) -> ResourceGauge {
        let budget = ResourceBudget::from_megabytes(500, 80.0).unwrap();
        ResourceGauge::with_sampler(budget, Arc::new(sampler.clone()))
    }

    #[test]
    fn test_within_budget() {
        let sampler = MockSampler::new(100 * MB, 10.0);
        assert!(!gauge(&sampler).is_over_budget());
    }

    #[test]
    fn test_memory_over_budget() {
        let sampler = MockSampler::new(501 * MB, 10.0);
        assert!(gauge(&sampler).is_over_budget());
    }

    #[test]
    fn test_cpu_over_budget() {
        let sampler = MockSampler::new(100 * MB, 80.5);
        assert!(gauge(&sampler).is_over_budget());
    }

    #[test]
    fn test_exactly_at_budget_is_within() {
        let sampler = MockSampler::new(500 * MB, 80.0);
        assert!(!gauge(&sampler).is_over_budget());
    }

    #[test]
    fn test_check_report() {
        let sampler = MockSampler::new(250 * MB, 95.0);
        let check = gauge(&sampler).check().unwrap();

        assert!(check.memory_ok);
        assert!(!check.cpu_ok);
        assert!((check.memory_percent - 50.0).abs() < 1e-9);
        assert!(check.is_over_budget());
    }

    #[test]
    fn test_sampling_failure_fails_open() {
        let sampler = MockSampler::new(900 * MB, 99.0);
        sampler.push_failure();
        let gauge = gauge(&sampler);

        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        tracing::subscriber::with_default(subscriber, || {
            assert!(!gauge.is_over_budget());
        });

        assert_eq!(gauge.metrics().sampling_failures(), 1);
        assert_eq!(capture.at_level(Level::WARN).len(), 1);

        // The next reading succeeds and is over budget.
        assert!(gauge.is_over_budget());
    }

    #[test]
    fn test_sample_error_surfaces_from_sample() {
        let gauge = gauge(&MockSampler::failing());
        assert!(gauge.sample().is_err());
        // Direct sampling does not count as a fail-open event.
        assert_eq!(gauge.metrics().sampling_failures(), 0);
    }
}
