//! Bounded-concurrency dispatch to the compute provider.
//!
//! The dispatch controller moves `Pending` records to `Submitted` by
//! handing their unit of work to the provider:
//!
//! - A global semaphore caps concurrent provider calls across all jobs,
//!   protecting the provider from bursts.
//! - Within one batch, a per-batch ceiling (default 5) additionally bounds
//!   fan-out; the ceiling is shared by that batch's children only and is
//!   independent of the webhook and reconciler paths.
//! - Failures are isolated per unit: a child whose dispatch fails is
//!   marked `Failed` with a dispatch-stage error while its siblings
//!   proceed; the parent aggregate picks up the partial failure.
//! - Transient provider errors retry with exponential backoff; permanent
//!   rejections fail the unit immediately.

mod retry;

pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS,
};

use crate::job::JobRecord;
use crate::lifecycle::{LifecycleError, LifecycleManager};
use crate::provider::{ComputeProvider, ProviderError, WorkRequest};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default ceiling on concurrent dispatches within one batch.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Default global ceiling on concurrent provider dispatch calls.
pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 32;

/// Errors surfaced by a single unit's dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The provider refused or kept failing; attempts are exhausted.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The lifecycle write after a provider call failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Shutdown was requested before the unit could be dispatched.
    #[error("dispatch aborted by shutdown")]
    Aborted,
}

/// Tuning knobs for the dispatch controller.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Global provider-call ceiling.
    pub global_concurrency: usize,

    /// Per-batch fan-out ceiling.
    pub batch_concurrency: usize,

    /// Backoff policy for transient errors.
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Sends units of work to the compute provider with bounded parallelism.
pub struct DispatchController {
    provider: Arc<dyn ComputeProvider>,
    lifecycle: Arc<LifecycleManager>,
    global_permits: Arc<Semaphore>,
    config: DispatchConfig,
    shutdown: CancellationToken,
}

impl DispatchController {
    /// Creates a controller.
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        lifecycle: Arc<LifecycleManager>,
        config: DispatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            lifecycle,
            global_permits: Arc::new(Semaphore::new(config.global_concurrency)),
            config,
            shutdown,
        }
    }

    /// Dispatches one individual job (or one batch child).
    ///
    /// On provider acceptance the record moves `Pending -> Submitted` with
    /// its external ref recorded. On exhausted or permanent failure the
    /// record moves to `Failed` with a dispatch-stage error, and the error
    /// is also returned for callers that care.
    pub async fn dispatch_one(&self, record: &JobRecord) -> Result<(), DispatchError> {
        if !record.is_dispatchable() {
            debug!(job_id = %record.id, status = %record.status, "Skipping non-dispatchable record");
            return Ok(());
        }

        let result = self.submit_with_retry(record).await;
        match result {
            Ok(external_ref) => {
                match self.lifecycle.mark_submitted(&record.id, &external_ref).await {
                    Ok(_) => Ok(()),
                    Err(LifecycleError::Transition(reason)) => {
                        // The record left Pending while the submit was in
                        // flight (a cancellation won the race). The provider
                        // accepted the work, so reclaim it rather than leave
                        // it running with no ref recorded anywhere.
                        info!(
                            job_id = %record.id,
                            external_ref,
                            reason = %reason,
                            "Record moved on during submit, cancelling at provider"
                        );
                        if let Err(cancel_err) = self.provider.cancel(&external_ref).await {
                            warn!(
                                job_id = %record.id,
                                external_ref,
                                error = %cancel_err,
                                "Could not cancel orphaned work at provider"
                            );
                        }
                        Ok(())
                    }
                    Err(err) => Err(DispatchError::Lifecycle(err)),
                }
            }
            Err(DispatchError::Aborted) => Err(DispatchError::Aborted),
            Err(err) => {
                // Contained per unit: record the failure, let the caller's
                // siblings proceed.
                let reason = format!("dispatch failed: {err}");
                if let Err(lifecycle_err) =
                    self.lifecycle.fail_dispatch(&record.id, &reason).await
                {
                    warn!(job_id = %record.id, error = %lifecycle_err, "Failed to record dispatch failure");
                }
                Err(err)
            }
        }
    }

    /// Dispatches a batch's children with the per-batch ceiling.
    ///
    /// One child's failure never aborts its siblings; every child ends up
    /// either `Submitted` or `Failed`. Returns the number of children
    /// successfully handed to the provider.
    pub async fn dispatch_batch(&self, children: Vec<JobRecord>) -> usize {
        let total = children.len();
        info!(
            children = total,
            ceiling = self.config.batch_concurrency,
            "Dispatching batch"
        );

        let submitted = stream::iter(children)
            .map(|child| async move {
                match self.dispatch_one(&child).await {
                    Ok(()) => 1usize,
                    Err(err) => {
                        debug!(job_id = %child.id, error = %err, "Batch child dispatch failed");
                        0
                    }
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .fold(0usize, |acc, n| async move { acc + n })
            .await;

        info!(submitted, total, "Batch dispatch finished");
        submitted
    }

    /// Calls the provider under the global ceiling, retrying transient
    /// errors per the policy.
    async fn submit_with_retry(&self, record: &JobRecord) -> Result<String, DispatchError> {
        let request = WorkRequest::new(record.id.clone(), record.input.clone());
        let mut last_err: Option<ProviderError> = None;

        for attempt in 1..=self.config.retry.max_attempts {
            if self.shutdown.is_cancelled() {
                return Err(DispatchError::Aborted);
            }

            let _permit = self
                .global_permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::Aborted)?;

            match self.provider.submit(&request).await {
                Ok(external_ref) => return Ok(external_ref),
                Err(err) if err.is_transient() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        job_id = %record.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient dispatch error, backing off"
                    );
                    last_err = Some(err);
                    drop(_permit);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.cancelled() => return Err(DispatchError::Aborted),
                    }
                }
                Err(err) => return Err(DispatchError::Provider(err)),
            }
        }

        // Attempts exhausted on transient errors.
        Err(DispatchError::Provider(last_err.unwrap_or_else(|| {
            ProviderError::Connect("retry budget exhausted".to_string())
        })))
    }
}
