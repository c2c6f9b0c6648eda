//! Read-through cache in front of the job store.
//!
//! The cache is a performance optimization, never a source of truth: every
//! entry carries a TTL, every lifecycle mutation invalidates the affected
//! job id and its parent chain, and a failing backend degrades the system
//! to direct store reads rather than wrong answers.
//!
//! Two entry families exist with different lifetimes:
//!
//! - **Job detail** (`job:{id}`) — a single record, short TTL.
//! - **Batch view** (`batch:gN:{id}`) — parent plus children plus derived
//!   progress, longer TTL. Batch view keys embed a namespace generation
//!   counter so the whole family can be invalidated coarsely in one bump.

mod memory;
mod service;
mod stats;

pub use memory::MemoryCache;
pub use service::JobCache;
pub use stats::CacheStats;

use std::time::Duration;
use thiserror::Error;

/// Default TTL for cached job detail entries (5 minutes).
pub const DEFAULT_DETAIL_TTL: Duration = Duration::from_secs(300);

/// Default TTL for cached batch views (10 minutes).
pub const DEFAULT_BATCH_TTL: Duration = Duration::from_secs(600);

/// Cache-related errors.
///
/// A backend error is a degradation signal, not a correctness failure:
/// callers fall back to the store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend is unreachable or failed the operation.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be decoded.
    #[error("cache entry corrupt for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key/value cache backend with per-entry TTL.
///
/// Implementations may be in-process ([`MemoryCache`]) or distributed.
/// All operations are fallible so an unavailable backend can be bypassed.
pub trait CacheBackend: Send + Sync + 'static {
    /// Fetches a value, honoring expiry.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores a value with the given time-to-live.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Removes a value. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}
