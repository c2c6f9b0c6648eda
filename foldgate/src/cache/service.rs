//! Read-through job cache service.

use super::{CacheBackend, CacheError, DEFAULT_BATCH_TTL, DEFAULT_DETAIL_TTL};
use crate::job::{JobId, JobRecord};
use crate::lifecycle::BatchView;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache facade over the job store's hot read paths.
///
/// Serves job detail and batch views with independent TTLs. All failures
/// of the underlying backend degrade to a miss: the caller falls through
/// to the store and the system stays correct, just slower.
///
/// Batch view keys embed a generation counter. Bumping the generation
/// orphans every batch view at once (coarse invalidation); orphaned
/// entries age out via their TTL.
pub struct JobCache {
    backend: Arc<dyn CacheBackend>,
    detail_ttl: Duration,
    batch_ttl: Duration,
    batch_generation: AtomicU64,
}

impl JobCache {
    /// Creates a cache service with default TTLs (5 min detail, 10 min
    /// batch views).
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_ttls(backend, DEFAULT_DETAIL_TTL, DEFAULT_BATCH_TTL)
    }

    /// Creates a cache service with explicit TTLs.
    pub fn with_ttls(backend: Arc<dyn CacheBackend>, detail_ttl: Duration, batch_ttl: Duration) -> Self {
        Self {
            backend,
            detail_ttl,
            batch_ttl,
            batch_generation: AtomicU64::new(0),
        }
    }

    fn detail_key(id: &JobId) -> String {
        format!("job:{id}")
    }

    fn batch_key(&self, id: &JobId) -> String {
        let generation = self.batch_generation.load(Ordering::Acquire);
        format!("batch:g{generation}:{id}")
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed, falling back to store");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                // A corrupt entry must never be served; drop it.
                let corrupt = CacheError::Corrupt {
                    key: key.to_string(),
                    reason: err.to_string(),
                };
                warn!(error = %corrupt, "Dropping corrupt cache entry");
                let _ = self.backend.delete(key);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, error = %err, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(err) = self.backend.set(key, bytes, ttl) {
            warn!(key, error = %err, "Cache write failed (degraded mode)");
        }
    }

    /// Fetches a cached job record.
    pub fn get_record(&self, id: &JobId) -> Option<JobRecord> {
        self.read(&Self::detail_key(id))
    }

    /// Caches a job record under the detail TTL.
    pub fn put_record(&self, record: &JobRecord) {
        self.write(&Self::detail_key(&record.id), record, self.detail_ttl);
    }

    /// Fetches a cached batch view for the current generation.
    pub fn get_batch_view(&self, parent_id: &JobId) -> Option<BatchView> {
        self.read(&self.batch_key(parent_id))
    }

    /// Caches a batch view under the batch TTL.
    pub fn put_batch_view(&self, view: &BatchView) {
        self.write(&self.batch_key(&view.parent.id), view, self.batch_ttl);
    }

    /// Precisely invalidates one job's detail and batch view entries.
    pub fn invalidate_job(&self, id: &JobId) {
        for key in [Self::detail_key(id), self.batch_key(id)] {
            if let Err(err) = self.backend.delete(&key) {
                warn!(key, error = %err, "Cache invalidation failed (entry will expire via TTL)");
            }
        }
        debug!(job_id = %id, "Invalidated cache entries");
    }

    /// Invalidates a job and, when present, its parent's entries.
    ///
    /// Called after every state mutation so point lookups are always
    /// precise; the parent's batch view is dropped because the child's
    /// transition changed the derived progress.
    pub fn invalidate_chain(&self, id: &JobId, parent_id: Option<&JobId>) {
        self.invalidate_job(id);
        if let Some(parent_id) = parent_id {
            self.invalidate_job(parent_id);
        }
    }

    /// Coarsely invalidates every batch view by bumping the key
    /// generation.
    pub fn invalidate_all_batch_views(&self) {
        let generation = self.batch_generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "Bumped batch view cache generation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::job::{JobInput, JobStatus, TaskKind};
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::individual(JobInput::new(
            TaskKind::FoldPrediction,
            json!({"sequence": "MKV"}),
        ))
    }

    fn cache() -> JobCache {
        JobCache::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn test_record_round_trip() {
        let cache = cache();
        let record = record();
        assert!(cache.get_record(&record.id).is_none());

        cache.put_record(&record);
        let cached = cache.get_record(&record.id).unwrap();
        assert_eq!(cached.id, record.id);
        assert_eq!(cached.status, JobStatus::Pending);
    }

    #[test]
    fn test_invalidate_job_removes_entry() {
        let cache = cache();
        let record = record();
        cache.put_record(&record);
        cache.invalidate_job(&record.id);
        assert!(cache.get_record(&record.id).is_none());
    }

    #[test]
    fn test_invalidate_chain_drops_parent_view() {
        let cache = cache();
        let parent = JobRecord::batch_parent(JobInput::new(
            TaskKind::BatchScreen,
            json!({"protein": "P1", "ligands": ["C", "CC"]}),
        ));
        let child = JobRecord::batch_child(
            JobInput::new(TaskKind::LigandDocking, json!({"protein": "P1", "ligand": "C"})),
            parent.id.clone(),
        );
        let view = BatchView::new(parent.clone(), vec![child.clone()]);

        cache.put_record(&parent);
        cache.put_batch_view(&view);
        cache.put_record(&child);

        cache.invalidate_chain(&child.id, child.parent_id.as_ref());

        assert!(cache.get_record(&child.id).is_none());
        assert!(cache.get_record(&parent.id).is_none());
        assert!(cache.get_batch_view(&parent.id).is_none());
    }

    #[test]
    fn test_generation_bump_orphans_batch_views() {
        let cache = cache();
        let parent = JobRecord::batch_parent(JobInput::new(
            TaskKind::BatchScreen,
            json!({"protein": "P1", "ligands": ["C", "CC"]}),
        ));
        let view = BatchView::new(parent.clone(), vec![]);
        cache.put_batch_view(&view);
        assert!(cache.get_batch_view(&parent.id).is_some());

        cache.invalidate_all_batch_views();
        assert!(cache.get_batch_view(&parent.id).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_dropped_not_served() {
        let backend = Arc::new(MemoryCache::new());
        let cache = JobCache::new(backend.clone());
        let record = record();
        let key = format!("job:{}", record.id);
        backend
            .set(&key, b"not json".to_vec(), Duration::from_secs(60))
            .unwrap();

        assert!(cache.get_record(&record.id).is_none());
        // The bad entry was deleted, not left to poison later reads.
        assert!(backend.get(&key).unwrap().is_none());
    }

    /// A backend that fails every operation, exercising degraded mode.
    struct BrokenBackend;

    impl CacheBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_broken_backend_degrades_to_miss() {
        let cache = JobCache::new(Arc::new(BrokenBackend));
        let record = record();
        // Writes and invalidations are absorbed, reads report a miss.
        cache.put_record(&record);
        cache.invalidate_job(&record.id);
        assert!(cache.get_record(&record.id).is_none());
    }
}
