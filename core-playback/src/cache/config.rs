//! Cache configuration and policies

use bridge_traits::RetryPolicy;
use core_async::time::Duration;

pub use core_runtime::config::EvictionPolicy;

/// Configuration for the audio cache gateway.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on cached audio bytes (default: 512 MiB)
    pub max_bytes: u64,

    /// Which blobs go first when a new one does not fit
    pub eviction_policy: EvictionPolicy,

    /// Bound on a single fetch attempt (default: 45s)
    pub fetch_timeout: Duration,

    /// Attempts per miss, first one included (default: 3)
    pub fetch_attempts: u32,

    /// Backoff before the second attempt, doubled after that
    pub retry_base_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 512 * 1024 * 1024,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
            fetch_timeout: Duration::from_secs(45),
            fetch_attempts: 3,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Backoff schedule for audio fetches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch_attempts,
            base_delay: self.retry_base_delay,
            max_delay: Duration::from_secs(10),
            use_exponential_backoff: true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_bytes == 0 && self.eviction_policy != EvictionPolicy::Manual {
            return Err("max_bytes must be greater than 0 unless eviction is manual".to_string());
        }
        if self.fetch_attempts == 0 {
            return Err("fetch_attempts must be at least 1".to_string());
        }
        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
