//! In-memory TTL cache backend.

use super::{CacheBackend, CacheError, CacheStats};
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entry in the memory cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached bytes.
    data: Vec<u8>,
    /// Instant past which the entry is dead.
    expires_at: Instant,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`CacheBackend`] with lazy TTL expiry.
///
/// Expired entries are dropped on the read path; there is no background
/// sweeper. This backend never reports itself unavailable, so degraded-mode
/// behavior is exercised in tests through a failing stub instead.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    stats: Mutex<CacheStats>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next read).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record<F: FnOnce(&mut CacheStats)>(&self, update: F) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.record(|s| {
                    s.expirations += 1;
                    s.misses += 1;
                });
                return Ok(None);
            }
            self.record(|s| s.hits += 1);
            return Ok(Some(entry.data.clone()));
        }
        self.record(|s| s.misses += 1);
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        if self.entries.remove(key).is_some() {
            self.record(|s| s.invalidations += 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", vec![1, 2, 3], Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("job:1").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_miss() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("absent").unwrap(), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_delete() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", vec![1], Duration::from_secs(60))
            .unwrap();
        cache.delete("job:1").unwrap();
        assert_eq!(cache.get("job:1").unwrap(), None);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let cache = MemoryCache::new();
        cache.delete("absent").unwrap();
        assert_eq!(cache.stats().invalidations, 0);
    }

    #[test]
    fn test_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", vec![1], Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("job:1").unwrap(), None);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_overwrite_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", vec![1], Duration::from_millis(10))
            .unwrap();
        cache
            .set("job:1", vec![2], Duration::from_secs(60))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("job:1").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = MemoryCache::new();
        cache
            .set("job:1", vec![1], Duration::from_secs(60))
            .unwrap();
        cache.get("job:1").unwrap();
        cache.get("job:1").unwrap();
        cache.get("other").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
