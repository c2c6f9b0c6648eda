//! HTTP client for the compute provider API.

use super::{ComputeProvider, ProviderError, WorkRequest, WorkStatus};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Default per-call timeout for provider requests.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpComputeProvider`].
#[derive(Clone, Debug)]
pub struct HttpProviderConfig {
    /// Base URL of the provider API, without trailing slash.
    pub base_url: String,

    /// Bearer token for the provider API.
    pub api_token: String,

    /// Per-call timeout. Applies to dispatch, status, and cancel alike.
    pub timeout: Duration,
}

impl HttpProviderConfig {
    /// Creates a config with the default timeout.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

/// [`ComputeProvider`] implementation over the provider's REST API.
///
/// Endpoints:
/// - `POST {base}/v1/work` — submit, returns `{"id": "..."}`
/// - `GET  {base}/v1/work/{ref}` — status
/// - `POST {base}/v1/work/{ref}/cancel` — cancellation request
pub struct HttpComputeProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpComputeProvider {
    /// Creates a provider client.
    ///
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.config.timeout)
        } else {
            ProviderError::Connect(err.to_string())
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 422 || status.as_u16() == 400 {
            // The provider understood the request and said no; retrying
            // the same input will not help.
            return Err(ProviderError::Rejected(body));
        }
        Err(ProviderError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn submit(&self, request: &WorkRequest) -> Result<String, ProviderError> {
        let url = self.url("/v1/work");
        debug!(job_id = %request.job_id, task = %request.input.task, "Submitting work to provider");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let response = self.check_status(response).await?;
        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        debug!(job_id = %request.job_id, external_ref = %submit.id, "Provider accepted work");
        Ok(submit.id)
    }

    async fn status(&self, external_ref: &str) -> Result<WorkStatus, ProviderError> {
        let url = self.url(&format!("/v1/work/{external_ref}"));
        trace!(external_ref, "Querying provider status");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn cancel(&self, external_ref: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("/v1/work/{external_ref}/cancel"));
        debug!(external_ref, "Requesting provider-side cancellation");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.check_status(response).await?;
        Ok(())
    }
}
