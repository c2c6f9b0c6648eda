//! Polling backstop for lost completion callbacks.
//!
//! Webhooks are the primary completion channel, but deliveries get lost:
//! the provider's sender crashes, the network eats the POST, or this
//! process was down at delivery time. The reconciler periodically sweeps
//! in-flight jobs that have gone quiet, asks the provider for their
//! status directly, and applies what it learns through the same
//! idempotent lifecycle path the webhook uses. If a webhook and a sweep
//! race, whichever lands first wins and the other is a no-op.
//!
//! The sweep also flags non-terminal jobs whose `updated_at` has gone
//! idle past a threshold, including jobs still `Pending` with no external
//! ref. Flagging is log-only; an operator decides whether a stuck job is
//! a provider outage or a genuinely long computation.

use crate::job::JobStatus;
use crate::lifecycle::{CompletionOutcome, LifecycleError, LifecycleManager};
use crate::provider::{ComputeProvider, WorkStatus};
use crate::store::{JobFilter, JobStore, Page, StoreError};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between sweeps.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Default quiet period before an in-flight job is polled.
pub const DEFAULT_COMPLETION_WINDOW: Duration = Duration::from_secs(120);

/// Default idle time past which a non-terminal job is flagged as stuck (2 h).
pub const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(2 * 60 * 60);

/// Maximum jobs examined per sweep.
const SWEEP_PAGE_LIMIT: usize = 200;

/// Tuning for the reconciliation loop.
#[derive(Clone, Copy, Debug)]
pub struct ReconcilerConfig {
    /// Time between sweeps.
    pub tick_interval: Duration,

    /// How long a job must have been quiet before it is polled. Keeps the
    /// reconciler from racing webhooks that are merely seconds behind.
    pub completion_window: Duration,

    /// Idle time (no `updated_at` advance) past which a non-terminal job
    /// is flagged in the logs.
    pub stuck_threshold: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            completion_window: DEFAULT_COMPLETION_WINDOW,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
        }
    }
}

/// Outcome counts for one sweep, logged and returned for tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs examined this sweep.
    pub examined: usize,

    /// Terminal outcomes applied.
    pub completed: usize,

    /// `Submitted -> Running` advancements applied.
    pub advanced: usize,

    /// Jobs flagged as stuck.
    pub stuck: usize,

    /// Provider status calls that failed.
    pub errors: usize,
}

/// Sweeps quiet in-flight jobs against the provider's view.
pub struct PollingReconciler {
    store: Arc<dyn JobStore>,
    lifecycle: Arc<LifecycleManager>,
    provider: Arc<dyn ComputeProvider>,
    config: ReconcilerConfig,
}

impl PollingReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        lifecycle: Arc<LifecycleManager>,
        provider: Arc<dyn ComputeProvider>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            provider,
            config,
        }
    }

    /// Runs sweeps until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "Reconciler started"
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh process
        // gives webhooks a full interval before polling.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report.examined > 0 => {
                            info!(
                                examined = report.examined,
                                completed = report.completed,
                                advanced = report.advanced,
                                stuck = report.stuck,
                                errors = report.errors,
                                "Reconciler sweep finished"
                            );
                        }
                        Ok(_) => debug!("Reconciler sweep found nothing to do"),
                        Err(e) => warn!(error = %e, "Reconciler sweep failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Reconciler stopped");
                    return;
                }
            }
        }
    }

    /// One pass over quiet in-flight jobs.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let quiet_cutoff = Utc::now()
            - ChronoDuration::from_std(self.config.completion_window)
                .unwrap_or_else(|_| ChronoDuration::seconds(120));
        let filter = JobFilter {
            statuses: vec![JobStatus::Submitted, JobStatus::Running],
            updated_before: Some(quiet_cutoff),
            has_external_ref: true,
            ..Default::default()
        };
        let candidates = self
            .store
            .query(
                &filter,
                Page {
                    offset: 0,
                    limit: SWEEP_PAGE_LIMIT,
                },
            )
            .await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for record in candidates {
            let Some(external_ref) = record.external_ref.clone() else {
                continue;
            };

            match self.provider.status(&external_ref).await {
                Ok(status) => {
                    if let Err(e) = self.apply(&external_ref, status, &mut report).await {
                        warn!(job_id = %record.id, error = %e, "Reconciler could not apply status");
                        report.errors += 1;
                    }
                }
                Err(e) => {
                    debug!(job_id = %record.id, external_ref, error = %e, "Status poll failed");
                    report.errors += 1;
                }
            }
        }

        self.flag_stuck(&mut report).await?;
        Ok(report)
    }

    /// Flags non-terminal jobs whose `updated_at` has not advanced within
    /// the stuck threshold.
    ///
    /// Runs as its own query so jobs the poll filter cannot reach (still
    /// `Pending`, no external ref) are covered too. Log-only: an operator
    /// decides what a stuck job means, the reconciler never transitions it.
    async fn flag_stuck(&self, report: &mut SweepReport) -> Result<(), StoreError> {
        let idle_cutoff = Utc::now()
            - ChronoDuration::from_std(self.config.stuck_threshold)
                .unwrap_or_else(|_| ChronoDuration::hours(2));
        let filter = JobFilter {
            statuses: vec![JobStatus::Pending, JobStatus::Submitted, JobStatus::Running],
            updated_before: Some(idle_cutoff),
            ..Default::default()
        };
        let stuck = self
            .store
            .query(
                &filter,
                Page {
                    offset: 0,
                    limit: SWEEP_PAGE_LIMIT,
                },
            )
            .await?;

        for record in stuck {
            warn!(
                job_id = %record.id,
                status = %record.status,
                external_ref = record.external_ref.as_deref().unwrap_or("none"),
                idle_secs = (Utc::now() - record.updated_at).num_seconds(),
                "Job idle past stuck threshold"
            );
            report.stuck += 1;
        }
        Ok(())
    }

    async fn apply(
        &self,
        external_ref: &str,
        status: WorkStatus,
        report: &mut SweepReport,
    ) -> Result<(), LifecycleError> {
        match status {
            WorkStatus::Pending => Ok(()),
            WorkStatus::Running => {
                let before = self.store.get_by_external_ref(external_ref).await?;
                let after = self.lifecycle.mark_running(external_ref).await?;
                if before.status != after.status {
                    report.advanced += 1;
                }
                Ok(())
            }
            WorkStatus::Success { result } => {
                let applied = self
                    .lifecycle
                    .complete(external_ref, CompletionOutcome::Success { result })
                    .await?;
                if applied.is_first() {
                    info!(external_ref, "Reconciler recovered lost completion");
                    report.completed += 1;
                }
                Ok(())
            }
            WorkStatus::Failure { error } => {
                let applied = self
                    .lifecycle
                    .complete(
                        external_ref,
                        CompletionOutcome::Failure {
                            error,
                            result: None,
                        },
                    )
                    .await?;
                if applied.is_first() {
                    report.completed += 1;
                }
                Ok(())
            }
        }
    }
}
