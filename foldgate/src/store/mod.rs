//! Durable job persistence boundary.
//!
//! The orchestrator treats the job store as an external document API:
//! get/put/query with no schema enforcement beyond the [`JobRecord`]
//! fields. [`MemoryJobStore`] is the in-tree implementation used for
//! development and tests; production deployments plug a durable backend
//! in behind the same trait.
//!
//! Writes carry an optimistic version check: `put` rejects a record whose
//! `version` does not match the stored one, which is how concurrent
//! lifecycle transitions against the same job are serialized (one applies,
//! the other observes the conflict and re-reads).

mod memory;

pub use memory::MemoryJobStore;

use crate::job::{JobId, JobKind, JobRecord, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from the job store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with the given id.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// No record with the given external ref.
    #[error("no job with external ref: {0}")]
    ExternalRefNotFound(String),

    /// A `put` raced with another writer; the caller should re-read.
    #[error("version conflict on job {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: JobId,
        expected: u64,
        actual: u64,
    },

    /// A record with this id already exists.
    #[error("duplicate job id: {0}")]
    DuplicateId(JobId),

    /// The backend itself failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Filter for `query`. Empty fields match everything.
#[derive(Clone, Debug, Default)]
pub struct JobFilter {
    /// Match any of these statuses.
    pub statuses: Vec<JobStatus>,

    /// Match this kind.
    pub kind: Option<JobKind>,

    /// Match children of this parent.
    pub parent_id: Option<JobId>,

    /// Match records whose `updated_at` is strictly before this instant.
    pub updated_before: Option<DateTime<Utc>>,

    /// Match only records that have an external ref.
    pub has_external_ref: bool,
}

impl JobFilter {
    /// Returns true if the record satisfies this filter.
    pub fn matches(&self, record: &JobRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if record.parent_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        if let Some(cutoff) = self.updated_before {
            if record.updated_at >= cutoff {
                return false;
            }
        }
        if self.has_external_ref && record.external_ref.is_none() {
            return false;
        }
        true
    }
}

/// A page request for `query`.
#[derive(Clone, Copy, Debug)]
pub struct Page {
    /// Number of records to skip.
    pub offset: usize,

    /// Maximum records to return.
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Document-style persistence for job records.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Fetches a record by id.
    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError>;

    /// Fetches the record holding the given provider external ref.
    async fn get_by_external_ref(&self, external_ref: &str) -> Result<JobRecord, StoreError>;

    /// Inserts a fresh record. Fails on duplicate id.
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError>;

    /// Writes back a mutated record.
    ///
    /// The record's `version` must equal the stored version; on success the
    /// stored version is incremented. A mismatch is a
    /// [`StoreError::VersionConflict`] and nothing is written.
    async fn put(&self, record: JobRecord) -> Result<JobRecord, StoreError>;

    /// Queries records by filter, ordered by `created_at`, paginated.
    async fn query(&self, filter: &JobFilter, page: Page) -> Result<Vec<JobRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobInput, TaskKind};
    use serde_json::json;

    fn record_with_status(status: JobStatus) -> JobRecord {
        let mut record = JobRecord::individual(JobInput::new(
            TaskKind::FoldPrediction,
            json!({"sequence": "MKV"}),
        ));
        record.status = status;
        record
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = JobFilter::default();
        assert!(filter.matches(&record_with_status(JobStatus::Pending)));
        assert!(filter.matches(&record_with_status(JobStatus::Completed)));
    }

    #[test]
    fn test_filter_by_status() {
        let filter = JobFilter {
            statuses: vec![JobStatus::Submitted, JobStatus::Running],
            ..Default::default()
        };
        assert!(filter.matches(&record_with_status(JobStatus::Submitted)));
        assert!(!filter.matches(&record_with_status(JobStatus::Pending)));
    }

    #[test]
    fn test_filter_by_external_ref_presence() {
        let filter = JobFilter {
            has_external_ref: true,
            ..Default::default()
        };
        let mut record = record_with_status(JobStatus::Submitted);
        assert!(!filter.matches(&record));
        record.external_ref = Some("ext-1".to_string());
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_filter_by_updated_before() {
        let record = record_with_status(JobStatus::Submitted);
        let filter = JobFilter {
            updated_before: Some(record.updated_at - chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!filter.matches(&record));

        let filter = JobFilter {
            updated_before: Some(record.updated_at + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(filter.matches(&record));
    }
}
