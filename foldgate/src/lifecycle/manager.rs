//! The lifecycle manager: the only writer of job status.

use super::aggregate::{derive_parent_status, BatchProgress};
use super::transition::{check_transition, TransitionCheck, TransitionError};
use crate::cache::JobCache;
use crate::job::{JobId, JobKind, JobRecord, JobStatus};
use crate::store::{JobFilter, JobStore, Page, StoreError};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An external ref is write-once; a second, different value is a bug
    /// in the dispatch path or a provider identity mix-up.
    #[error("external ref already set on job {id}: {existing} (attempted {attempted})")]
    ExternalRefConflict {
        id: JobId,
        existing: String,
        attempted: String,
    },
}

/// Terminal outcome carried by a completion signal (webhook or reconciler).
#[derive(Clone, Debug)]
pub enum CompletionOutcome {
    /// The provider finished the work and produced a result payload.
    Success { result: serde_json::Value },

    /// The provider reports failure (or execution timeout) with a reason
    /// and an optional diagnostic payload.
    Failure {
        error: String,
        result: Option<serde_json::Value>,
    },
}

impl CompletionOutcome {
    fn target_status(&self) -> JobStatus {
        match self {
            Self::Success { .. } => JobStatus::Completed,
            Self::Failure { .. } => JobStatus::Failed,
        }
    }
}

/// Result of an idempotent apply: either this call performed the write or
/// an earlier delivery already had.
#[derive(Clone, Debug)]
pub enum Applied {
    /// This call performed the transition.
    First(JobRecord),

    /// The job was already terminal; nothing was written, `updated_at`
    /// untouched.
    Duplicate(JobRecord),
}

impl Applied {
    /// The record after the operation, whichever arm applied.
    pub fn record(&self) -> &JobRecord {
        match self {
            Self::First(record) | Self::Duplicate(record) => record,
        }
    }

    /// Returns true if this call performed the write.
    pub fn is_first(&self) -> bool {
        matches!(self, Self::First(_))
    }
}

/// Owns all job state transitions.
///
/// Every status write goes through this type. A per-job async lock
/// serializes writers of the same record in this process; the store's
/// version check catches any writer that bypasses the lock. Two
/// concurrent terminal attempts against one job therefore resolve to
/// exactly one applied write and one duplicate.
///
/// Parent aggregation runs after each child transition: the parent's
/// derived status moves monotonically (children only move forward) and is
/// never written over an explicitly cancelled parent.
pub struct LifecycleManager {
    store: Arc<dyn JobStore>,
    cache: Arc<JobCache>,
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

impl LifecycleManager {
    /// Creates a manager over the given store and cache.
    pub fn new(store: Arc<dyn JobStore>, cache: Arc<JobCache>) -> Self {
        Self {
            store,
            cache,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &JobId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Records a successful dispatch: `Pending -> Submitted` plus the
    /// provider's external ref (write-once).
    pub async fn mark_submitted(
        &self,
        id: &JobId,
        external_ref: &str,
    ) -> Result<JobRecord, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self.store.get(id).await?;
        if let Some(existing) = &record.external_ref {
            if existing != external_ref {
                return Err(LifecycleError::ExternalRefConflict {
                    id: id.clone(),
                    existing: existing.clone(),
                    attempted: external_ref.to_string(),
                });
            }
        }

        match check_transition(record.status, JobStatus::Submitted)? {
            TransitionCheck::Duplicate => return Ok(record),
            TransitionCheck::Apply => {}
        }

        record.status = JobStatus::Submitted;
        record.external_ref = Some(external_ref.to_string());
        record.touch();
        let record = self.store.put(record).await?;

        info!(job_id = %id, external_ref, "Job submitted to provider");
        self.cache
            .invalidate_chain(&record.id, record.parent_id.as_ref());
        self.refresh_parent_of(&record).await?;
        Ok(record)
    }

    /// Applies the provider's optional in-progress signal.
    pub async fn mark_running(&self, external_ref: &str) -> Result<JobRecord, LifecycleError> {
        let found = self.store.get_by_external_ref(external_ref).await?;
        let lock = self.lock_for(&found.id);
        let _guard = lock.lock().await;

        let mut record = self.store.get(&found.id).await?;
        match check_transition(record.status, JobStatus::Running)? {
            TransitionCheck::Duplicate => return Ok(record),
            TransitionCheck::Apply => {}
        }

        record.status = JobStatus::Running;
        record.touch();
        let record = self.store.put(record).await?;

        debug!(job_id = %record.id, external_ref, "Job running at provider");
        self.cache
            .invalidate_chain(&record.id, record.parent_id.as_ref());
        self.refresh_parent_of(&record).await?;
        Ok(record)
    }

    /// Applies a terminal outcome keyed by external ref.
    ///
    /// This is the shared idempotent path for the webhook processor and
    /// the polling reconciler: the first caller wins, later callers get
    /// [`Applied::Duplicate`] with nothing written.
    pub async fn complete(
        &self,
        external_ref: &str,
        outcome: CompletionOutcome,
    ) -> Result<Applied, LifecycleError> {
        let found = self.store.get_by_external_ref(external_ref).await?;
        let lock = self.lock_for(&found.id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a racing writer may have won.
        let mut record = self.store.get(&found.id).await?;
        let target = outcome.target_status();

        match check_transition(record.status, target)? {
            TransitionCheck::Duplicate => {
                debug!(
                    job_id = %record.id,
                    external_ref,
                    status = %record.status,
                    "Duplicate completion delivery ignored"
                );
                return Ok(Applied::Duplicate(record));
            }
            TransitionCheck::Apply => {}
        }

        record.status = target;
        match outcome {
            CompletionOutcome::Success { result } => {
                record.result = Some(result);
                record.error = None;
            }
            CompletionOutcome::Failure { error, result } => {
                record.result = result;
                record.error = Some(error);
            }
        }
        record.touch();
        let record = self.store.put(record).await?;

        info!(job_id = %record.id, external_ref, status = %record.status, "Job reached terminal state");
        self.cache
            .invalidate_chain(&record.id, record.parent_id.as_ref());
        self.refresh_parent_of(&record).await?;
        Ok(Applied::First(record))
    }

    /// Marks a dispatch-stage failure: the unit never reached the
    /// provider.
    pub async fn fail_dispatch(&self, id: &JobId, error: &str) -> Result<Applied, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self.store.get(id).await?;
        match check_transition(record.status, JobStatus::Failed)? {
            TransitionCheck::Duplicate => return Ok(Applied::Duplicate(record)),
            TransitionCheck::Apply => {}
        }

        record.status = JobStatus::Failed;
        record.error = Some(error.to_string());
        record.touch();
        let record = self.store.put(record).await?;

        warn!(job_id = %id, error, "Job failed at dispatch stage");
        self.cache
            .invalidate_chain(&record.id, record.parent_id.as_ref());
        self.refresh_parent_of(&record).await?;
        Ok(Applied::First(record))
    }

    /// Cancels a non-terminal job.
    ///
    /// A job the provider already finished keeps its real outcome: the
    /// terminal check resolves this call to a duplicate.
    pub async fn cancel(&self, id: &JobId) -> Result<Applied, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut record = self.store.get(id).await?;
        match check_transition(record.status, JobStatus::Cancelled)? {
            TransitionCheck::Duplicate => return Ok(Applied::Duplicate(record)),
            TransitionCheck::Apply => {}
        }

        record.status = JobStatus::Cancelled;
        record.touch();
        let record = self.store.put(record).await?;

        info!(job_id = %id, "Job cancelled");
        self.cache
            .invalidate_chain(&record.id, record.parent_id.as_ref());
        self.refresh_parent_of(&record).await?;
        Ok(Applied::First(record))
    }

    /// Loads a parent's children and progress tallies.
    pub async fn batch_progress(&self, parent_id: &JobId) -> Result<(Vec<JobRecord>, BatchProgress), LifecycleError> {
        let children = self
            .store
            .query(
                &JobFilter {
                    parent_id: Some(parent_id.clone()),
                    ..Default::default()
                },
                Page {
                    offset: 0,
                    limit: usize::MAX,
                },
            )
            .await?;
        let progress = BatchProgress::from_children(&children);
        Ok((children, progress))
    }

    /// Recomputes and writes a parent's derived status after a child
    /// mutation.
    async fn refresh_parent_of(&self, child: &JobRecord) -> Result<(), LifecycleError> {
        let Some(parent_id) = &child.parent_id else {
            return Ok(());
        };

        let lock = self.lock_for(parent_id);
        let _guard = lock.lock().await;

        let mut parent = self.store.get(parent_id).await?;
        if parent.kind != JobKind::BatchParent {
            warn!(job_id = %parent_id, kind = %parent.kind, "parent_id points at a non-parent record");
            return Ok(());
        }
        // An explicitly cancelled (or otherwise terminal) parent is frozen.
        if parent.status.is_terminal() {
            return Ok(());
        }

        let (_, progress) = self.batch_progress(parent_id).await?;
        let derived = derive_parent_status(&progress);
        if derived == parent.status {
            return Ok(());
        }

        parent.status = derived;
        if derived == JobStatus::Failed && parent.error.is_none() {
            parent.error = Some(format!(
                "all {} children terminal, none completed ({} failed, {} cancelled)",
                progress.total, progress.failed, progress.cancelled
            ));
        }
        parent.touch();
        let parent = self.store.put(parent).await?;

        info!(
            job_id = %parent.id,
            status = %parent.status,
            completed = progress.completed,
            failed = progress.failed,
            total = progress.total,
            "Batch parent aggregate updated"
        );
        self.cache.invalidate_job(&parent.id);
        Ok(())
    }
}
