//! Deferred work that must not block a request path.
//!
//! Completion processing and cancellation both produce follow-up work
//! whose latency the caller should never pay: archiving a result payload,
//! telling the provider to stop a unit that is no longer wanted. Those
//! are enqueued here and drained by a single background worker.
//!
//! Each effect is attempted twice. A second failure is logged and the
//! effect dropped; the job record itself is already durable, so a lost
//! effect costs an archive copy or an orphaned provider-side unit, both
//! of which are recoverable out of band.

use crate::job::JobId;
use crate::provider::ComputeProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default depth of the side-effect queue.
pub const DEFAULT_EFFECT_QUEUE_DEPTH: usize = 256;

/// A unit of deferred work.
#[derive(Clone, Debug)]
pub enum SideEffect {
    /// Archive a terminal result payload.
    StoreResult {
        job_id: JobId,
        external_ref: String,
        result: Value,
    },

    /// Best-effort remote cancellation of an in-flight unit.
    CancelRemote { external_ref: String },
}

/// Destination for terminal result payloads.
#[async_trait]
pub trait ResultArchive: Send + Sync + 'static {
    async fn store(&self, job_id: &JobId, result: &Value) -> Result<(), String>;
}

/// Archive that discards everything. The default when no archive is
/// configured; the result still lives on the job record.
pub struct NullResultArchive;

#[async_trait]
impl ResultArchive for NullResultArchive {
    async fn store(&self, _job_id: &JobId, _result: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Non-blocking producer half of the side-effect queue.
#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    /// Enqueues an effect without waiting. A full or closed queue drops
    /// the effect with a warning rather than stalling the caller.
    pub fn enqueue(&self, effect: SideEffect) {
        if let Err(e) = self.tx.try_send(effect) {
            warn!(error = %e, "Side effect dropped, queue unavailable");
        }
    }
}

/// Background consumer of the side-effect queue.
pub struct SideEffectWorker {
    rx: mpsc::Receiver<SideEffect>,
    archive: Arc<dyn ResultArchive>,
    provider: Arc<dyn ComputeProvider>,
}

impl SideEffectWorker {
    /// Builds the queue and its worker.
    pub fn new(
        archive: Arc<dyn ResultArchive>,
        provider: Arc<dyn ComputeProvider>,
    ) -> (SideEffectQueue, Self) {
        let (tx, rx) = mpsc::channel(DEFAULT_EFFECT_QUEUE_DEPTH);
        (
            SideEffectQueue { tx },
            Self {
                rx,
                archive,
                provider,
            },
        )
    }

    /// Drains the queue until shutdown. Effects already enqueued at
    /// shutdown are still processed before the task exits.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Side-effect worker started");
        loop {
            tokio::select! {
                effect = self.rx.recv() => {
                    match effect {
                        Some(effect) => self.apply_with_retry(effect).await,
                        None => break,
                    }
                }
                _ = shutdown.cancelled() => {
                    self.rx.close();
                    while let Some(effect) = self.rx.recv().await {
                        self.apply_with_retry(effect).await;
                    }
                    break;
                }
            }
        }
        info!("Side-effect worker stopped");
    }

    async fn apply_with_retry(&self, effect: SideEffect) {
        if let Err(first) = self.apply(&effect).await {
            warn!(error = %first, "Side effect failed, retrying once");
            if let Err(second) = self.apply(&effect).await {
                warn!(error = %second, ?effect, "Side effect abandoned after retry");
            }
        }
    }

    async fn apply(&self, effect: &SideEffect) -> Result<(), String> {
        match effect {
            SideEffect::StoreResult {
                job_id, result, ..
            } => {
                self.archive.store(job_id, result).await?;
                debug!(job_id = %job_id, "Result archived");
                Ok(())
            }
            SideEffect::CancelRemote { external_ref } => {
                self.provider
                    .cancel(external_ref)
                    .await
                    .map_err(|e| e.to_string())?;
                debug!(external_ref, "Remote cancellation requested");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, WorkRequest, WorkStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct RecordingArchive {
        stored: Mutex<Vec<JobId>>,
        fail_first: AtomicUsize,
    }

    #[async_trait]
    impl ResultArchive for RecordingArchive {
        async fn store(&self, job_id: &JobId, _result: &Value) -> Result<(), String> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err("archive offline".to_string());
            }
            self.stored.lock().await.push(job_id.clone());
            Ok(())
        }
    }

    struct CancelCountingProvider {
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl ComputeProvider for CancelCountingProvider {
        async fn submit(&self, _request: &WorkRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Rejected("not under test".to_string()))
        }

        async fn status(&self, _external_ref: &str) -> Result<WorkStatus, ProviderError> {
            Ok(WorkStatus::Pending)
        }

        async fn cancel(&self, _external_ref: &str) -> Result<(), ProviderError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn harness(fail_first: usize) -> (Arc<RecordingArchive>, Arc<CancelCountingProvider>, SideEffectQueue, SideEffectWorker) {
        let archive = Arc::new(RecordingArchive {
            stored: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(fail_first),
        });
        let provider = Arc::new(CancelCountingProvider {
            cancels: AtomicUsize::new(0),
        });
        let (queue, worker) = SideEffectWorker::new(archive.clone(), provider.clone());
        (archive, provider, queue, worker)
    }

    #[tokio::test]
    async fn test_store_result_reaches_archive() {
        let (archive, _provider, queue, worker) = harness(0);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        queue.enqueue(SideEffect::StoreResult {
            job_id: JobId::from("job-1"),
            external_ref: "ext-1".to_string(),
            result: serde_json::json!({"score": 0.92}),
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(archive.stored.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let (archive, _provider, queue, worker) = harness(1);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        queue.enqueue(SideEffect::StoreResult {
            job_id: JobId::from("job-1"),
            external_ref: "ext-1".to_string(),
            result: Value::Null,
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(archive.stored.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_double_failure_is_abandoned() {
        let (archive, _provider, queue, worker) = harness(2);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        queue.enqueue(SideEffect::StoreResult {
            job_id: JobId::from("job-1"),
            external_ref: "ext-1".to_string(),
            result: Value::Null,
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(archive.stored.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_drained_on_shutdown() {
        let (_archive, provider, queue, worker) = harness(0);
        let shutdown = CancellationToken::new();

        for i in 0..10 {
            queue.enqueue(SideEffect::CancelRemote {
                external_ref: format!("ext-{i}"),
            });
        }
        shutdown.cancel();
        worker.run(shutdown).await;

        assert_eq!(provider.cancels.load(Ordering::SeqCst), 10);
    }
}
