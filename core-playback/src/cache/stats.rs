//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

/// Snapshot of the audio cache.
///
/// `cached_songs` and `total_bytes` come from the store; the counters cover
/// this gateway's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_songs: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// HTTP requests issued, retries included
    pub network_fetches: u64,
    /// Requests that joined a fetch already in flight
    pub coalesced_requests: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Usage as a percentage of `max_bytes`.
    pub fn usage_percentage(&self, max_bytes: u64) -> f64 {
        if max_bytes == 0 {
            return 0.0;
        }
        (self.total_bytes as f64 / max_bytes as f64) * 100.0
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_and_hit_rate() {
        let stats = CacheStats {
            total_bytes: 250,
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.usage_percentage(1000), 25.0);
        assert_eq!(stats.usage_percentage(0), 0.0);
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
