//! External compute provider boundary.
//!
//! The provider is the opaque GPU service that actually executes
//! predictions. The orchestrator only ever speaks three verbs to it:
//! submit a unit of work, query a unit's status, and request cancellation.
//! Everything else (models, queuing, hardware) is the provider's business.
//!
//! [`ProviderError`] separates transient failures (timeouts, 5xx,
//! connection errors), which the dispatch controller retries with backoff,
//! from permanent rejections, which fail the unit immediately. A timeout
//! is never an implicit success or failure of the underlying job.

mod http;

pub use http::{HttpComputeProvider, HttpProviderConfig, DEFAULT_PROVIDER_TIMEOUT};

use crate::job::{JobId, JobInput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call did not complete within its deadline.
    #[error("provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Could not reach the provider at all.
    #[error("provider unreachable: {0}")]
    Connect(String),

    /// The provider answered with an HTTP error status.
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The provider rejected the unit of work as invalid.
    #[error("provider rejected work: {0}")]
    Rejected(String),

    /// The provider's response could not be decoded.
    #[error("undecodable provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Returns true if retrying the same call may succeed.
    ///
    /// Server-side errors (5xx) and transport failures are transient;
    /// rejections and undecodable responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

/// One unit of work handed to the provider: an individual job or a single
/// batch child.
#[derive(Clone, Debug, Serialize)]
pub struct WorkRequest {
    /// Orchestrator-side job id, echoed back in webhook metadata.
    pub job_id: JobId,

    /// The input to execute.
    pub input: JobInput,
}

impl WorkRequest {
    /// Builds the request for a job record's dispatch.
    pub fn new(job_id: JobId, input: JobInput) -> Self {
        Self { job_id, input }
    }
}

/// Status of a unit of work as reported by the provider's status endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkStatus {
    /// Queued at the provider.
    Pending,

    /// Executing.
    Running,

    /// Finished with a result payload.
    Success {
        #[serde(default)]
        result: serde_json::Value,
    },

    /// Finished with an error.
    Failure {
        #[serde(default)]
        error: String,
    },
}

impl WorkStatus {
    /// Returns true if the provider considers the work finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failure { .. })
    }
}

/// The external compute provider interface.
#[async_trait]
pub trait ComputeProvider: Send + Sync + 'static {
    /// Submits a unit of work. Returns the provider's reference for it.
    async fn submit(&self, request: &WorkRequest) -> Result<String, ProviderError>;

    /// Queries the status of previously submitted work.
    async fn status(&self, external_ref: &str) -> Result<WorkStatus, ProviderError>;

    /// Requests cancellation of previously submitted work. Best effort:
    /// work the provider already finished stays finished.
    async fn cancel(&self, external_ref: &str) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(ProviderError::Connect("refused".into()).is_transient());
        assert!(ProviderError::Http {
            status: 503,
            body: "overloaded".into()
        }
        .is_transient());

        assert!(!ProviderError::Http {
            status: 422,
            body: "bad smiles".into()
        }
        .is_transient());
        assert!(!ProviderError::Rejected("unknown task".into()).is_transient());
        assert!(!ProviderError::Decode("not json".into()).is_transient());
    }

    #[test]
    fn test_work_status_decoding() {
        let status: WorkStatus =
            serde_json::from_value(json!({"status": "running"})).unwrap();
        assert_eq!(status, WorkStatus::Running);
        assert!(!status.is_terminal());

        let status: WorkStatus =
            serde_json::from_value(json!({"status": "success", "result": {"rmsd": 1.2}}))
                .unwrap();
        assert!(status.is_terminal());
        assert_eq!(
            status,
            WorkStatus::Success {
                result: json!({"rmsd": 1.2})
            }
        );

        let status: WorkStatus =
            serde_json::from_value(json!({"status": "failure", "error": "oom"})).unwrap();
        assert_eq!(
            status,
            WorkStatus::Failure {
                error: "oom".into()
            }
        );
    }
}
