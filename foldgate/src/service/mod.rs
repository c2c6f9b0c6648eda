//! Front door for submissions, reads, and cancellation.
//!
//! [`JobService`] is what the HTTP layer talks to. It owns the glue the
//! individual subsystems deliberately do not: classification feeding
//! persistence, persistence feeding dispatch, reads flowing through the
//! cache, and cancellation fanning out across a batch.
//!
//! Dispatch is detached from submission. A submit call returns as soon as
//! the plan is durable; provider traffic happens on a spawned task so the
//! client sees their job id immediately and polls for progress.

mod side_effects;

pub use side_effects::{
    NullResultArchive, ResultArchive, SideEffect, SideEffectQueue, SideEffectWorker,
    DEFAULT_EFFECT_QUEUE_DEPTH,
};

use crate::cache::JobCache;
use crate::classifier::{classify, JobPlan, SubmissionPayload, ValidationError};
use crate::dispatch::DispatchController;
use crate::job::{JobId, JobKind, JobRecord};
use crate::lifecycle::{BatchView, LifecycleError, LifecycleManager};
use crate::store::{JobStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submission payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No job with the given id.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A batch operation was requested on a non-batch job.
    #[error("job {0} is not a batch parent")]
    NotABatch(JobId),

    /// Persistence failed.
    #[error(transparent)]
    Store(StoreError),

    /// A lifecycle transition failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Orchestration facade over classification, persistence, dispatch,
/// caching, and cancellation.
pub struct JobService {
    store: Arc<dyn JobStore>,
    cache: Arc<JobCache>,
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Arc<DispatchController>,
    effects: SideEffectQueue,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        cache: Arc<JobCache>,
        lifecycle: Arc<LifecycleManager>,
        dispatcher: Arc<DispatchController>,
        effects: SideEffectQueue,
    ) -> Self {
        Self {
            store,
            cache,
            lifecycle,
            dispatcher,
            effects,
        }
    }

    /// Accepts a submission: classify, persist, then dispatch in the
    /// background. Returns the root record (the job itself, or the batch
    /// parent) still in `Pending`.
    pub async fn submit(&self, payload: SubmissionPayload) -> Result<JobRecord, ServiceError> {
        let plan = classify(payload)?;

        // Parent-first so a child never references a missing parent.
        for record in plan.records() {
            self.store.insert(record.clone()).await?;
        }

        let dispatcher = self.dispatcher.clone();
        let root = match plan {
            JobPlan::Individual(record) => {
                info!(job_id = %record.id, task = ?record.input.task, "Individual job accepted");
                let unit = record.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch_one(&unit).await {
                        debug!(job_id = %unit.id, error = %e, "Background dispatch failed");
                    }
                });
                record
            }
            JobPlan::Batch { parent, children } => {
                info!(
                    job_id = %parent.id,
                    children = children.len(),
                    "Batch accepted"
                );
                tokio::spawn(async move {
                    dispatcher.dispatch_batch(children).await;
                });
                parent
            }
        };
        Ok(root)
    }

    /// Fetches a job, cache first.
    pub async fn get_job(&self, id: &JobId) -> Result<JobRecord, ServiceError> {
        if let Some(record) = self.cache.get_record(id) {
            return Ok(record);
        }
        let record = self.store.get(id).await?;
        self.cache.put_record(&record);
        Ok(record)
    }

    /// Fetches a batch parent with its children and progress tallies,
    /// cache first.
    pub async fn get_batch_view(&self, id: &JobId) -> Result<BatchView, ServiceError> {
        let parent = self.get_job(id).await?;
        if parent.kind != JobKind::BatchParent {
            return Err(ServiceError::NotABatch(id.clone()));
        }
        if let Some(view) = self.cache.get_batch_view(id) {
            return Ok(view);
        }
        let (children, _) = self.lifecycle.batch_progress(id).await?;
        let view = BatchView::new(parent, children);
        self.cache.put_batch_view(&view);
        Ok(view)
    }

    /// Cancels a job.
    ///
    /// For a batch parent the parent is cancelled first, freezing its
    /// derived status, then every non-terminal child is cancelled. Units
    /// already at the provider get a best-effort remote cancellation via
    /// the side-effect queue; a unit the provider finishes first keeps
    /// its real outcome.
    pub async fn cancel(&self, id: &JobId) -> Result<JobRecord, ServiceError> {
        let record = self.store.get(id).await?;

        if record.kind == JobKind::BatchParent {
            self.lifecycle.cancel(id).await?;
            let (children, _) = self.lifecycle.batch_progress(id).await?;
            for child in children {
                if child.status.is_terminal() {
                    continue;
                }
                self.cancel_unit(&child).await?;
            }
            return Ok(self.store.get(id).await?);
        }

        self.cancel_unit(&record).await?;
        Ok(self.store.get(id).await?)
    }

    async fn cancel_unit(&self, record: &JobRecord) -> Result<(), ServiceError> {
        let in_flight = record.status.is_in_flight_at_provider();
        let applied = self.lifecycle.cancel(&record.id).await?;
        if applied.is_first() && in_flight {
            if let Some(external_ref) = &record.external_ref {
                self.effects.enqueue(SideEffect::CancelRemote {
                    external_ref: external_ref.clone(),
                });
            } else {
                warn!(job_id = %record.id, "In-flight job has no external ref to cancel remotely");
            }
        }
        Ok(())
    }
}
