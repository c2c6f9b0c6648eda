//! The persisted job record.

use super::id::JobId;
use super::input::JobInput;
use super::status::{JobKind, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job record as held by the job store.
///
/// Field invariants:
/// - `parent_id` is present only on batch children and is a weak reference
///   (lookup only, no ownership).
/// - `external_ref`, once set, never changes.
/// - `result` is present only in `Completed`/`Failed`; `error` only in
///   `Failed`.
/// - `updated_at` is monotonically non-decreasing.
/// - `version` increments on every write and backs the store's optimistic
///   concurrency check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque unique identifier.
    pub id: JobId,

    /// Shape of the job, fixed at classification.
    pub kind: JobKind,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Owning batch parent, present only on batch children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,

    /// Identifier returned by the compute provider once dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,

    /// The submitted input. Immutable after creation.
    pub input: JobInput,

    /// Result payload, present only once terminal with an outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Human-readable failure reason, present only when `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Record creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency counter.
    #[serde(default)]
    pub version: u64,
}

impl JobRecord {
    /// Creates a new individual job in `Pending`.
    pub fn individual(input: JobInput) -> Self {
        Self::fresh(JobKind::Individual, input, None)
    }

    /// Creates a new batch parent in `Pending`.
    pub fn batch_parent(input: JobInput) -> Self {
        Self::fresh(JobKind::BatchParent, input, None)
    }

    /// Creates a new batch child in `Pending`, referencing its parent.
    pub fn batch_child(input: JobInput, parent_id: JobId) -> Self {
        Self::fresh(JobKind::BatchChild, input, Some(parent_id))
    }

    fn fresh(kind: JobKind, input: JobInput, parent_id: Option<JobId>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            kind,
            status: JobStatus::Pending,
            parent_id,
            external_ref: None,
            input,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Advances `updated_at`, keeping it monotonically non-decreasing even
    /// if the wall clock steps backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Returns true if this record may be dispatched to the provider.
    ///
    /// Batch parents are never dispatched; their status is derived.
    pub fn is_dispatchable(&self) -> bool {
        self.status == JobStatus::Pending && self.kind != JobKind::BatchParent
    }
}
