//! Callback payload shape.

use super::WebhookError;
use crate::lifecycle::CompletionOutcome;
use serde::Deserialize;
use serde_json::Value;

/// Terminal status claimed by a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// Work finished with a result.
    Success,

    /// Work finished with an error.
    Failure,

    /// The provider gave up on the work. Treated as a failure with a
    /// timeout reason.
    Timeout,
}

/// Parsed webhook body.
///
/// ```json
/// {"external_ref": "...", "status": "success", "result": {...}, "metadata": {...}}
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct CallbackPayload {
    /// The provider's reference for the unit of work.
    pub external_ref: String,

    /// Claimed terminal status.
    pub status: CallbackStatus,

    /// Result payload on success (or diagnostics on failure).
    #[serde(default)]
    pub result: Option<Value>,

    /// Failure reason.
    #[serde(default)]
    pub error: Option<String>,

    /// Provider-side metadata, passed through unexamined.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl CallbackPayload {
    /// Parses a raw (already authenticated) body.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let payload: Self =
            serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        if payload.external_ref.trim().is_empty() {
            return Err(WebhookError::Malformed(
                "external_ref must not be empty".to_string(),
            ));
        }
        if payload.status == CallbackStatus::Success && payload.result.is_none() {
            return Err(WebhookError::Malformed(
                "success callback carries no result".to_string(),
            ));
        }
        Ok(payload)
    }

    /// Converts the callback into the lifecycle's terminal outcome.
    pub fn into_outcome(self) -> CompletionOutcome {
        match self.status {
            CallbackStatus::Success => CompletionOutcome::Success {
                result: self.result.unwrap_or(Value::Null),
            },
            CallbackStatus::Failure => CompletionOutcome::Failure {
                error: self
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
                result: self.result,
            },
            CallbackStatus::Timeout => CompletionOutcome::Failure {
                error: self
                    .error
                    .unwrap_or_else(|| "execution timed out at provider".to_string()),
                result: self.result,
            },
        }
    }
}
