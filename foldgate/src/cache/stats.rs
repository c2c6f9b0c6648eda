//! Cache statistics tracking.

/// Counters for cache behavior, for monitoring and tests.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,

    /// Reads that fell through to the store.
    pub misses: u64,

    /// Entries dropped because their TTL expired on read.
    pub expirations: u64,

    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Creates a zeroed statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit rate over all reads (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
