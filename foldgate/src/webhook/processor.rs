//! The webhook apply path.

use super::payload::CallbackPayload;
use super::signature::{verify_freshness, verify_signature};
use super::WebhookError;
use crate::lifecycle::{Applied, LifecycleError, LifecycleManager};
use crate::service::{SideEffect, SideEffectQueue};
use crate::store::StoreError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Authentication material pulled off the HTTP request.
#[derive(Clone, Debug, Default)]
pub struct CallbackHeaders {
    /// `X-Signature: sha256=<hex>`.
    pub signature: Option<String>,

    /// `X-Timestamp: <unix seconds>`.
    pub timestamp: Option<String>,
}

/// What a delivery did, for the HTTP layer to acknowledge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackDisposition {
    /// First delivery; the terminal state was written.
    Applied,

    /// Redelivery of an already-applied outcome; nothing written.
    Duplicate,
}

/// Verifies, parses, and applies completion callbacks.
pub struct WebhookProcessor {
    secret: Vec<u8>,
    freshness_window: Duration,
    lifecycle: Arc<LifecycleManager>,
    effects: SideEffectQueue,
}

impl WebhookProcessor {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        freshness_window: Duration,
        lifecycle: Arc<LifecycleManager>,
        effects: SideEffectQueue,
    ) -> Self {
        Self {
            secret: secret.into(),
            freshness_window,
            lifecycle,
            effects,
        }
    }

    /// Runs a delivery through the full gate sequence.
    ///
    /// Authentication failures and malformed bodies reject before any
    /// state is read. Duplicates acknowledge without writing so the
    /// provider stops redelivering.
    pub async fn process(
        &self,
        headers: &CallbackHeaders,
        body: &[u8],
    ) -> Result<CallbackDisposition, WebhookError> {
        self.authenticate(headers, body)?;

        let payload = CallbackPayload::parse(body)?;
        let external_ref = payload.external_ref.clone();

        let applied = self
            .lifecycle
            .complete(&external_ref, payload.into_outcome())
            .await
            .map_err(|e| match e {
                LifecycleError::Store(StoreError::ExternalRefNotFound(r)) => {
                    WebhookError::UnknownRef(r)
                }
                other => WebhookError::Internal(other.to_string()),
            })?;

        match applied {
            Applied::First(record) => {
                if let Some(result) = &record.result {
                    self.effects.enqueue(SideEffect::StoreResult {
                        job_id: record.id.clone(),
                        external_ref: external_ref.clone(),
                        result: result.clone(),
                    });
                }
                info!(job_id = %record.id, external_ref, "Webhook completion applied");
                Ok(CallbackDisposition::Applied)
            }
            Applied::Duplicate(record) => {
                info!(job_id = %record.id, external_ref, "Webhook redelivery acknowledged");
                Ok(CallbackDisposition::Duplicate)
            }
        }
    }

    fn authenticate(&self, headers: &CallbackHeaders, body: &[u8]) -> Result<(), WebhookError> {
        let signature = headers
            .signature
            .as_deref()
            .ok_or(WebhookError::Unauthorized("missing signature header"))?;
        let timestamp = headers
            .timestamp
            .as_deref()
            .ok_or(WebhookError::Unauthorized("missing timestamp header"))?;

        if let Err(e) = verify_signature(&self.secret, body, signature) {
            warn!(reason = %e, "Webhook rejected");
            return Err(e);
        }
        if let Err(e) = verify_freshness(timestamp, Utc::now().timestamp(), self.freshness_window) {
            warn!(reason = %e, "Webhook rejected");
            return Err(e);
        }
        Ok(())
    }
}
