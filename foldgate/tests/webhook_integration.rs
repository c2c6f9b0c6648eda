//! Integration tests for webhook completion processing.
//!
//! These tests verify the completion pipeline end to end:
//! - Authentication gates (signature, freshness) leave state untouched
//! - First-delivery apply vs redelivery acknowledgement
//! - Concurrent duplicate deliveries resolve to exactly one apply
//! - Webhook and reconciler paths produce identical record shapes
//!
//! Run with: `cargo test --test webhook_integration`

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use foldgate::cache::{JobCache, MemoryCache};
use foldgate::job::{JobInput, JobRecord, JobStatus, TaskKind};
use foldgate::lifecycle::LifecycleManager;
use foldgate::provider::{ComputeProvider, ProviderError, WorkRequest, WorkStatus};
use foldgate::reconciler::{PollingReconciler, ReconcilerConfig};
use foldgate::service::{NullResultArchive, SideEffectWorker};
use foldgate::store::{JobStore, MemoryJobStore};
use foldgate::webhook::{
    sign_body, CallbackDisposition, CallbackHeaders, WebhookError, WebhookProcessor,
    DEFAULT_FRESHNESS_WINDOW,
};

const SECRET: &[u8] = b"integration-secret";

// ============================================================================
// Test Helpers
// ============================================================================

/// Provider answering status polls from a scripted table.
struct StatusTableProvider {
    statuses: Mutex<std::collections::HashMap<String, WorkStatus>>,
}

impl StatusTableProvider {
    fn new() -> Self {
        Self {
            statuses: Mutex::new(std::collections::HashMap::new()),
        }
    }

    async fn script(&self, external_ref: &str, status: WorkStatus) {
        self.statuses
            .lock()
            .await
            .insert(external_ref.to_string(), status);
    }
}

#[async_trait]
impl ComputeProvider for StatusTableProvider {
    async fn submit(&self, _request: &WorkRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Rejected("not under test".to_string()))
    }

    async fn status(&self, external_ref: &str) -> Result<WorkStatus, ProviderError> {
        self.statuses
            .lock()
            .await
            .get(external_ref)
            .cloned()
            .ok_or(ProviderError::Connect("no scripted status".to_string()))
    }

    async fn cancel(&self, _external_ref: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryJobStore>,
    provider: Arc<StatusTableProvider>,
    processor: Arc<WebhookProcessor>,
    reconciler: PollingReconciler,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let cache = Arc::new(JobCache::new(Arc::new(MemoryCache::new())));
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), cache));
    let provider = Arc::new(StatusTableProvider::new());
    let (effects, worker) = SideEffectWorker::new(Arc::new(NullResultArchive), provider.clone());
    tokio::spawn(worker.run(CancellationToken::new()));

    let processor = Arc::new(WebhookProcessor::new(
        SECRET,
        DEFAULT_FRESHNESS_WINDOW,
        lifecycle.clone(),
        effects,
    ));
    let reconciler = PollingReconciler::new(
        store.clone(),
        lifecycle,
        provider.clone(),
        ReconcilerConfig {
            completion_window: Duration::ZERO,
            ..Default::default()
        },
    );
    Harness {
        store,
        provider,
        processor,
        reconciler,
    }
}

async fn seed_submitted(store: &MemoryJobStore, external_ref: &str) -> JobRecord {
    let mut record = JobRecord::individual(JobInput::new(
        TaskKind::LigandDocking,
        json!({"protein": "P69905", "ligand": "CCO"}),
    ));
    record.status = JobStatus::Submitted;
    record.external_ref = Some(external_ref.to_string());
    store.insert(record.clone()).await.unwrap();
    record
}

fn success_body(external_ref: &str) -> Vec<u8> {
    json!({
        "external_ref": external_ref,
        "status": "success",
        "result": {"affinity": -7.9, "pose": "docked.sdf"},
    })
    .to_string()
    .into_bytes()
}

fn signed_headers(body: &[u8]) -> CallbackHeaders {
    CallbackHeaders {
        signature: Some(sign_body(SECRET, body)),
        timestamp: Some(Utc::now().timestamp().to_string()),
    }
}

/// Snapshot of the fields a delivery may mutate.
fn snapshot(record: &JobRecord) -> (JobStatus, Option<String>, u64, chrono::DateTime<Utc>) {
    (
        record.status,
        record.error.clone(),
        record.version,
        record.updated_at,
    )
}

// ============================================================================
// Authentication Gates
// ============================================================================

#[tokio::test]
async fn test_rejected_delivery_is_a_pure_no_op() {
    let h = harness();
    let record = seed_submitted(&h.store, "ext-1").await;
    let before = snapshot(&h.store.get(&record.id).await.unwrap());

    let body = success_body("ext-1");
    let attempts = [
        // Wrong secret.
        CallbackHeaders {
            signature: Some(sign_body(b"attacker", &body)),
            timestamp: Some(Utc::now().timestamp().to_string()),
        },
        // Stale timestamp.
        CallbackHeaders {
            signature: Some(sign_body(SECRET, &body)),
            timestamp: Some((Utc::now().timestamp() - 3600).to_string()),
        },
        // No headers at all.
        CallbackHeaders::default(),
    ];

    for headers in attempts {
        let err = h.processor.process(&headers, &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::Unauthorized(_)));
    }

    let after = snapshot(&h.store.get(&record.id).await.unwrap());
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_malformed_body_after_valid_auth_is_rejected() {
    let h = harness();
    seed_submitted(&h.store, "ext-1").await;

    let body = b"{\"external_ref\": \"ext-1\"".to_vec();
    let err = h
        .processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::Malformed(_)));
}

#[tokio::test]
async fn test_unknown_external_ref() {
    let h = harness();
    let body = success_body("never-submitted");
    let err = h
        .processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::UnknownRef(_)));
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_redelivery_leaves_record_unchanged() {
    let h = harness();
    let record = seed_submitted(&h.store, "ext-1").await;

    let body = success_body("ext-1");
    h.processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();
    let applied = snapshot(&h.store.get(&record.id).await.unwrap());

    let disposition = h
        .processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();
    assert_eq!(disposition, CallbackDisposition::Duplicate);
    assert_eq!(snapshot(&h.store.get(&record.id).await.unwrap()), applied);
}

#[tokio::test]
async fn test_conflicting_redelivery_keeps_first_outcome() {
    let h = harness();
    let record = seed_submitted(&h.store, "ext-1").await;

    let body = success_body("ext-1");
    h.processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();

    // A later failure claim for the same ref must not overwrite.
    let conflicting = json!({
        "external_ref": "ext-1",
        "status": "failure",
        "error": "late contradictory report",
    })
    .to_string()
    .into_bytes();
    let disposition = h
        .processor
        .process(&signed_headers(&conflicting), &conflicting)
        .await
        .unwrap();
    assert_eq!(disposition, CallbackDisposition::Duplicate);

    let stored = h.store.get(&record.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn test_concurrent_deliveries_apply_exactly_once() {
    let h = harness();
    seed_submitted(&h.store, "ext-1").await;

    let body = success_body("ext-1");
    let mut handles = Vec::new();
    for _ in 0..8 {
        let processor = h.processor.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            let headers = signed_headers(&body);
            processor.process(&headers, &body).await.unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap() == CallbackDisposition::Applied {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

// ============================================================================
// Reconciler Equivalence
// ============================================================================

#[tokio::test]
async fn test_reconciler_and_webhook_produce_identical_shape() {
    let h = harness();
    let via_webhook = seed_submitted(&h.store, "ext-hook").await;
    let via_sweep = seed_submitted(&h.store, "ext-sweep").await;
    let result = json!({"affinity": -7.9, "pose": "docked.sdf"});

    // One job completes through the webhook path.
    let body = success_body("ext-hook");
    h.processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();

    // The other completes through a reconciler sweep.
    h.provider
        .script(
            "ext-sweep",
            WorkStatus::Success {
                result: result.clone(),
            },
        )
        .await;
    h.reconciler.sweep().await.unwrap();

    let hooked = h.store.get(&via_webhook.id).await.unwrap();
    let swept = h.store.get(&via_sweep.id).await.unwrap();
    assert_eq!(hooked.status, swept.status);
    assert_eq!(hooked.result, swept.result);
    assert_eq!(hooked.error, swept.error);
}

#[tokio::test]
async fn test_webhook_then_sweep_does_not_double_apply() {
    let h = harness();
    let record = seed_submitted(&h.store, "ext-1").await;

    let body = success_body("ext-1");
    h.processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();
    let applied = snapshot(&h.store.get(&record.id).await.unwrap());

    // A sweep afterward finds nothing in flight to touch.
    h.provider
        .script("ext-1", WorkStatus::Success { result: json!({}) })
        .await;
    let report = h.reconciler.sweep().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(snapshot(&h.store.get(&record.id).await.unwrap()), applied);
}

#[tokio::test]
async fn test_timeout_callback_fails_job_with_reason() {
    let h = harness();
    let record = seed_submitted(&h.store, "ext-1").await;

    let body = json!({
        "external_ref": "ext-1",
        "status": "timeout",
    })
    .to_string()
    .into_bytes();
    h.processor
        .process(&signed_headers(&body), &body)
        .await
        .unwrap();

    let stored = h.store.get(&record.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error.as_deref().unwrap_or_default().contains("timed out"));
}
