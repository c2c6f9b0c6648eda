//! In-memory job store on a concurrent map.

use super::{JobFilter, JobStore, Page, StoreError};
use crate::job::{JobId, JobRecord};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory [`JobStore`] with document semantics.
///
/// Backs development and tests. Writes go through the same optimistic
/// version check a durable backend would perform, so concurrency behavior
/// matches production.
#[derive(Default)]
pub struct MemoryJobStore {
    records: DashMap<JobId, JobRecord>,
    /// Secondary index: provider external ref → job id.
    by_external_ref: DashMap<String, JobId>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        self.records
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn get_by_external_ref(&self, external_ref: &str) -> Result<JobRecord, StoreError> {
        let id = self
            .by_external_ref
            .get(external_ref)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::ExternalRefNotFound(external_ref.to_string()))?;
        self.get(&id).await
    }

    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        if let Some(external_ref) = &record.external_ref {
            self.by_external_ref
                .insert(external_ref.clone(), record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn put(&self, mut record: JobRecord) -> Result<JobRecord, StoreError> {
        let mut entry = self
            .records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;

        if entry.version != record.version {
            return Err(StoreError::VersionConflict {
                id: record.id.clone(),
                expected: record.version,
                actual: entry.version,
            });
        }

        record.version += 1;
        if let Some(external_ref) = &record.external_ref {
            self.by_external_ref
                .insert(external_ref.clone(), record.id.clone());
        }
        *entry = record.clone();
        Ok(record)
    }

    async fn query(&self, filter: &JobFilter, page: Page) -> Result<Vec<JobRecord>, StoreError> {
        let mut matched: Vec<JobRecord> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_str().cmp(b.id.as_str())));
        Ok(matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }
}
