//! Configuration values and their validation.
//!
//! Every component validates its configuration at construction time. Invalid
//! values are programming errors and fail fast with a [`ConfigError`]; nothing
//! else in the governor returns an error for expected conditions.

use crate::domain::resources::ResourceBudget;
use std::fmt;
use std::time::Duration;

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: usize = 10;
/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Default cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
/// Default cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
/// Default memory budget in MiB.
pub const DEFAULT_MAX_MEMORY_MB: u64 = 500;
/// Default CPU budget in percent.
pub const DEFAULT_MAX_CPU_PERCENT: f64 = 80.0;
/// Default cap on limiter re-evaluation rounds.
pub const DEFAULT_MAX_WAIT_ROUNDS: u32 = 32;

/// Error returned when a configuration value is invalid.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `max_requests` must be greater than zero
    ZeroMaxRequests,
    /// The rate window must be longer than zero
    ZeroWindow,
    /// Cache capacity must be greater than zero
    ZeroCacheCapacity,
    /// Cache TTL must be longer than zero
    ZeroTtl,
    /// The limiter needs at least one re-evaluation round
    ZeroMaxWaitRounds,
    /// CPU budget must be a positive, finite percentage
    InvalidCpuLimit(f64),
    /// A retry policy needs at least one attempt
    ZeroMaxAttempts,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroMaxRequests => write!(f, "max_requests must be greater than 0"),
            ConfigError::ZeroWindow => write!(f, "rate window must be greater than 0"),
            ConfigError::ZeroCacheCapacity => write!(f, "cache capacity must be greater than 0"),
            ConfigError::ZeroTtl => write!(f, "cache ttl must be greater than 0"),
            ConfigError::ZeroMaxWaitRounds => {
                write!(f, "max_wait_rounds must be greater than 0")
            }
            ConfigError::InvalidCpuLimit(v) => {
                write!(f, "cpu limit must be a positive finite percentage, got {}", v)
            }
            ConfigError::ZeroMaxAttempts => write!(f, "max_attempts must be greater than 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Sliding-window limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    max_requests: usize,
    window: Duration,
    max_wait_rounds: u32,
}

impl LimiterConfig {
    /// Allow at most `max_requests` per rolling `window`.
    ///
    /// # Errors
    /// Returns an error if either value is zero.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            max_requests,
            window,
            max_wait_rounds: DEFAULT_MAX_WAIT_ROUNDS,
        })
    }

    /// Cap the number of sleep-and-recheck rounds in one `acquire` call.
    ///
    /// # Errors
    /// Returns an error if `rounds` is zero.
    pub fn with_max_wait_rounds(mut self, rounds: u32) -> Result<Self, ConfigError> {
        if rounds == 0 {
            return Err(ConfigError::ZeroMaxWaitRounds);
        }
        self.max_wait_rounds = rounds;
        Ok(self)
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Re-evaluation cap.
    pub fn max_wait_rounds(&self) -> u32 {
        self.max_wait_rounds
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            max_wait_rounds: DEFAULT_MAX_WAIT_ROUNDS,
        }
    }
}

/// TTL cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    max_size: usize,
    ttl: Duration,
}

impl CacheConfig {
    /// Hold at most `max_size` entries, each readable for `ttl`.
    ///
    /// # Errors
    /// Returns an error if either value is zero.
    pub fn new(max_size: usize, ttl: Duration) -> Result<Self, ConfigError> {
        if max_size == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(Self { max_size, ttl })
    }

    /// Maximum number of entries.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Time-to-live of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// Flat governor configuration, suitable for loading from a file.
///
/// Loading is the caller's concern; with the `serde` feature this type
/// deserializes from any serde format, and missing fields take the defaults.
///
/// ```
/// use fetch_governor::GovernorConfig;
///
/// let config = GovernorConfig::default();
/// assert_eq!(config.max_requests, 10);
/// assert_eq!(config.window_secs, 60);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GovernorConfig {
    /// Requests admitted per window
    pub max_requests: usize,
    /// Window length in seconds
    pub window_secs: u64,
    /// Cache capacity
    pub cache_capacity: usize,
    /// Cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Memory budget in MiB
    pub max_memory_mb: u64,
    /// CPU budget in percent
    pub max_cpu_percent: f64,
    /// Cap on limiter re-evaluation rounds
    pub max_wait_rounds: u32,
    /// Extra keywords marking an error as transient
    pub extra_retry_keywords: Vec<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            max_cpu_percent: DEFAULT_MAX_CPU_PERCENT,
            max_wait_rounds: DEFAULT_MAX_WAIT_ROUNDS,
            extra_retry_keywords: Vec::new(),
        }
    }
}

impl GovernorConfig {
    /// Limiter section.
    ///
    /// # Errors
    /// Returns an error if a limiter value is invalid.
    pub fn limiter(&self) -> Result<LimiterConfig, ConfigError> {
        LimiterConfig::new(self.max_requests, Duration::from_secs(self.window_secs))?
            .with_max_wait_rounds(self.max_wait_rounds)
    }

    /// Cache section.
    ///
    /// # Errors
    /// Returns an error if a cache value is invalid.
    pub fn cache(&self) -> Result<CacheConfig, ConfigError> {
        CacheConfig::new(
            self.cache_capacity,
            Duration::from_secs(self.cache_ttl_secs),
        )
    }

    /// Resource budget section.
    ///
    /// # Errors
    /// Returns an error if the CPU limit is invalid.
    pub fn budget(&self) -> Result<ResourceBudget, ConfigError> {
        ResourceBudget::from_megabytes(self.max_memory_mb, self.max_cpu_percent)
    }

    /// Validate every section.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limiter()?;
        self.cache()?;
        self.budget()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_config_rejects_zero() {
        assert_eq!(
            LimiterConfig::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroMaxRequests)
        );
        assert_eq!(
            LimiterConfig::new(1, Duration::ZERO),
            Err(ConfigError::ZeroWindow)
        );
    }

    #[test]
    fn test_limiter_config_wait_rounds() {
        let config = LimiterConfig::new(2, Duration::from_secs(60)).unwrap();
        assert_eq!(config.max_wait_rounds(), DEFAULT_MAX_WAIT_ROUNDS);

        let config = config.with_max_wait_rounds(4).unwrap();
        assert_eq!(config.max_wait_rounds(), 4);

        assert_eq!(
            config.with_max_wait_rounds(0),
            Err(ConfigError::ZeroMaxWaitRounds)
        );
    }

    #[test]
    fn test_cache_config_rejects_zero() {
        assert_eq!(
            CacheConfig::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroCacheCapacity)
        );
        assert_eq!(CacheConfig::new(1, Duration::ZERO), Err(ConfigError::ZeroTtl));
    }

    #[test]
    fn test_governor_config_defaults_are_valid() {
        let config = GovernorConfig::default();
        assert!(config.validate().is_ok());

        let limiter = config.limiter().unwrap();
        assert_eq!(limiter.max_requests(), 10);
        assert_eq!(limiter.window(), Duration::from_secs(60));

        let cache = config.cache().unwrap();
        assert_eq!(cache.max_size(), 1000);
        assert_eq!(cache.ttl(), Duration::from_secs(300));

        let budget = config.budget().unwrap();
        assert_eq!(budget.max_memory_bytes(), 500 * 1024 * 1024);
    }

    #[test]
    fn test_governor_config_reports_first_error() {
        let config = GovernorConfig {
            max_requests: 0,
            cache_capacity: 0,
            ..GovernorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxRequests));

        let config = GovernorConfig {
            max_cpu_percent: f64::NAN,
            ..GovernorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCpuLimit(_))
        ));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::ZeroMaxRequests.to_string(),
            "max_requests must be greater than 0"
        );
        assert_eq!(
            ConfigError::ZeroTtl.to_string(),
            "cache ttl must be greater than 0"
        );
    }
}
