//! Mock resource sampler for testing.

use crate::application::ports::{ResourceSampler, SampleError};
use crate::domain::resources::ResourceUsage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct SamplerState {
    current: Reading,
    script: VecDeque<Reading>,
    calls: usize,
}

#[derive(Debug, Clone, Copy)]
enum Reading {
    Usage(ResourceUsage),
    Failure,
}

/// Sampler returning usage set by the test.
///
/// Readings queued with [`push_usage`](Self::push_usage) or
/// [`push_failure`](Self::push_failure) are returned first, one per call;
/// after that every call returns the current reading.
///
/// ```
/// use fetch_governor::infrastructure::mocks::MockSampler;
/// use fetch_governor::application::ports::ResourceSampler;
///
/// let sampler = MockSampler::new(100 * 1024 * 1024, 10.0);
/// sampler.push_failure();
///
/// assert!(sampler.sample().is_err());
/// assert_eq!(sampler.sample().unwrap().cpu_percent, 10.0);
/// assert_eq!(sampler.calls(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockSampler {
    state: Arc<Mutex<SamplerState>>,
}

impl MockSampler {
    /// Create a sampler reporting fixed usage.
    pub fn new(memory_bytes: u64, cpu_percent: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SamplerState {
                current: Reading::Usage(ResourceUsage {
                    memory_bytes,
                    cpu_percent,
                }),
                script: VecDeque::new(),
                calls: 0,
            })),
        }
    }

    /// Create a sampler reporting no usage at all.
    pub fn idle() -> Self {
        Self::new(0, 0.0)
    }

    /// Create a sampler whose every call fails.
    pub fn failing() -> Self {
        let sampler = Self::idle();
        sampler.lock().current = Reading::Failure;
        sampler
    }

    /// Replace the reading returned once the script is exhausted.
    pub fn set_usage(&self, memory_bytes: u64, cpu_percent: f64) {
        self.lock().current = Reading::Usage(ResourceUsage {
            memory_bytes,
            cpu_percent,
        });
    }

    /// Queue a single usage reading.
    pub fn push_usage(&self, memory_bytes: u64, cpu_percent: f64) {
        self.lock().script.push_back(Reading::Usage(ResourceUsage {
            memory_bytes,
            cpu_percent,
        }));
    }

    /// Queue a single failed reading.
    pub fn push_failure(&self) {
        self.lock().script.push_back(Reading::Failure);
    }

    /// Number of times `sample` has been called.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceSampler for MockSampler {
    fn sample(&self) -> Result<ResourceUsage, SampleError> {
        let mut state = self.lock();
        state.calls += 1;
        let reading = state.script.pop_front().unwrap_or(state.current);
        match reading {
            Reading::Usage(usage) => Ok(usage),
            Reading::Failure => Err(SampleError::Parse("scripted failure".to_string())),
        }
    }
}
