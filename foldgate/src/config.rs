//! Runtime settings.
//!
//! Plain data, resolved by the binary (flags, environment) before any
//! subsystem starts. Each section converts into the richer config type
//! its subsystem consumes, so subsystems never read settings directly.

use crate::cache::{DEFAULT_BATCH_TTL, DEFAULT_DETAIL_TTL};
use crate::dispatch::{DispatchConfig, RetryPolicy};
use crate::provider::{HttpProviderConfig, DEFAULT_PROVIDER_TIMEOUT};
use crate::reconciler::ReconcilerConfig;
use crate::webhook::DEFAULT_FRESHNESS_WINDOW;
use std::time::Duration;

/// Compute provider connection settings.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    /// Base URL of the provider API.
    pub base_url: String,

    /// Bearer token for provider calls.
    pub api_token: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn to_config(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            timeout: self.timeout,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8700".to_string(),
            api_token: String::new(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// Dispatch concurrency and retry settings.
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub global_concurrency: usize,
    pub batch_concurrency: usize,
    pub max_attempts: u32,
}

impl DispatchSettings {
    pub fn to_config(&self) -> DispatchConfig {
        DispatchConfig {
            global_concurrency: self.global_concurrency,
            batch_concurrency: self.batch_concurrency,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..Default::default()
            },
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            global_concurrency: defaults.global_concurrency,
            batch_concurrency: defaults.batch_concurrency,
            max_attempts: defaults.retry.max_attempts,
        }
    }
}

/// Read-cache TTLs.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub detail_ttl: Duration,
    pub batch_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            detail_ttl: DEFAULT_DETAIL_TTL,
            batch_ttl: DEFAULT_BATCH_TTL,
        }
    }
}

/// Webhook authentication settings.
#[derive(Clone, Debug)]
pub struct WebhookSettings {
    /// Shared HMAC secret, agreed with the provider out of band.
    pub secret: String,

    /// Allowed timestamp skew on callbacks.
    pub freshness_window: Duration,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }
}

/// Reconciler sweep settings.
#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    pub tick_interval: Duration,
    pub completion_window: Duration,
    pub stuck_threshold: Duration,
}

impl ReconcilerSettings {
    pub fn to_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            tick_interval: self.tick_interval,
            completion_window: self.completion_window,
            stuck_threshold: self.stuck_threshold,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        let defaults = ReconcilerConfig::default();
        Self {
            tick_interval: defaults.tick_interval,
            completion_window: defaults.completion_window,
            stuck_threshold: defaults.stuck_threshold,
        }
    }
}

/// Top-level settings bundle.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub dispatch: DispatchSettings,
    pub cache: CacheSettings,
    pub webhook: WebhookSettings,
    pub reconciler: ReconcilerSettings,
}
