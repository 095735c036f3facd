//! Process resource usage and budgets.

use crate::domain::config::ConfigError;
use std::time::Instant;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Raw usage reported by a resource sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// Resident set size in bytes
    pub memory_bytes: u64,
    /// CPU utilisation of the process, in percent of one core
    pub cpu_percent: f64,
}

/// A usage reading stamped with the instant it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// Resident set size in bytes
    pub memory_bytes: u64,
    /// CPU utilisation in percent
    pub cpu_percent: f64,
    /// When the sample was taken
    pub sampled_at: Instant,
}

impl ResourceSample {
    /// Stamp a raw reading.
    pub fn new(usage: ResourceUsage, sampled_at: Instant) -> Self {
        Self {
            memory_bytes: usage.memory_bytes,
            cpu_percent: usage.cpu_percent,
            sampled_at,
        }
    }
}

/// Memory and CPU ceilings for the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceBudget {
    max_memory_bytes: u64,
    max_cpu_percent: f64,
}

impl ResourceBudget {
    /// Create a budget.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidCpuLimit` unless `max_cpu_percent` is
    /// positive and finite.
    pub fn new(max_memory_bytes: u64, max_cpu_percent: f64) -> Result<Self, ConfigError> {
        if !max_cpu_percent.is_finite() || max_cpu_percent <= 0.0 {
            return Err(ConfigError::InvalidCpuLimit(max_cpu_percent));
        }
        Ok(Self {
            max_memory_bytes,
            max_cpu_percent,
        })
    }

    /// Create a budget with the memory ceiling in MiB.
    ///
    /// # Errors
    /// Same as [`ResourceBudget::new`].
    pub fn from_megabytes(max_memory_mb: u64, max_cpu_percent: f64) -> Result<Self, ConfigError> {
        Self::new(max_memory_mb.saturating_mul(BYTES_PER_MB), max_cpu_percent)
    }

    /// Memory ceiling in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    /// CPU ceiling in percent.
    pub fn max_cpu_percent(&self) -> f64 {
        self.max_cpu_percent
    }

    /// Evaluate a sample against the budget.
    pub fn check(&self, sample: ResourceSample) -> ResourceCheck {
        let memory_percent = if self.max_memory_bytes == 0 {
            f64::INFINITY
        } else {
            sample.memory_bytes as f64 / self.max_memory_bytes as f64 * 100.0
        };
        ResourceCheck {
            sample,
            memory_ok: sample.memory_bytes <= self.max_memory_bytes,
            cpu_ok: sample.cpu_percent <= self.max_cpu_percent,
            memory_percent,
        }
    }

    /// True iff the sample exceeds either ceiling.
    pub fn is_exceeded_by(&self, sample: ResourceSample) -> bool {
        self.check(sample).is_over_budget()
    }
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            max_memory_bytes: crate::domain::config::DEFAULT_MAX_MEMORY_MB * BYTES_PER_MB,
            max_cpu_percent: crate::domain::config::DEFAULT_MAX_CPU_PERCENT,
        }
    }
}

/// A sample evaluated against a budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceCheck {
    /// The evaluated sample
    pub sample: ResourceSample,
    /// Memory is at or below the ceiling
    pub memory_ok: bool,
    /// CPU is at or below the ceiling
    pub cpu_ok: bool,
    /// Memory use as a percentage of the ceiling
    pub memory_percent: f64,
}

impl ResourceCheck {
    /// True iff memory or CPU exceeds its ceiling.
    pub fn is_over_budget(&self) -> bool {
        !(self.memory_ok && self.cpu_ok)
    }
}
