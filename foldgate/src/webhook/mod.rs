//! Webhook completion processing.
//!
//! Completion callbacks arrive from the provider as untrusted HTTP POSTs
//! and pass through three gates, in order:
//!
//! 1. **Authenticity** ([`signature`]): HMAC-SHA256 over the raw body
//!    against the shared secret, compared in constant time, plus a
//!    timestamp freshness window bounding replay risk. Failures reject
//!    with no state touched.
//! 2. **Shape** ([`payload`]): the JSON body must parse into a
//!    [`CallbackPayload`]. Parse failures after auth reject with no state
//!    touched.
//! 3. **Idempotent apply** ([`processor`]): the shared terminal-transition
//!    path. Duplicate deliveries acknowledge without writing; first
//!    deliveries persist, invalidate cache, and hand result storage to the
//!    side-effect worker so the HTTP response never waits on it.

mod payload;
mod processor;
mod signature;

pub use payload::{CallbackPayload, CallbackStatus};
pub use processor::{CallbackDisposition, CallbackHeaders, WebhookProcessor};
pub use signature::{sign_body, verify_freshness, verify_signature, DEFAULT_FRESHNESS_WINDOW};

use thiserror::Error;

/// Rejection or failure of a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature or freshness check failed. Maps to HTTP 401. The public
    /// message is deliberately vague; the precise reason is logged
    /// server-side only.
    #[error("webhook authentication failed: {0}")]
    Unauthorized(&'static str),

    /// The body is not a valid callback payload. Maps to HTTP 400.
    #[error("malformed callback: {0}")]
    Malformed(String),

    /// No job carries the claimed external ref. Maps to HTTP 404.
    #[error("unknown external ref: {0}")]
    UnknownRef(String),

    /// Persistence failed mid-apply; the reconciler will recover the
    /// completion. Maps to HTTP 500.
    #[error("completion could not be persisted: {0}")]
    Internal(String),
}
