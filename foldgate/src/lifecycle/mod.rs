//! Job lifecycle management.
//!
//! All status writes in the system flow through this module. The design
//! splits into three layers:
//!
//! - [`transition`]: the pure state-machine check. Given a current and a
//!   requested status, decide apply / idempotent no-op / invalid.
//! - [`aggregate`]: derivation of a batch parent's status and progress
//!   from its children. A parent's status is never set independently once
//!   children exist.
//! - [`manager`]: the [`LifecycleManager`], which serializes writers per
//!   job (lock map plus store version check), applies transitions, refreshes
//!   parent aggregates, and invalidates cache entries.
//!
//! Terminal transitions keyed by external ref are shared between the
//! webhook processor and the polling reconciler: whichever arrives first
//! wins, later arrivals are observed as duplicates and change nothing —
//! not even `updated_at`.

mod aggregate;
mod manager;
mod transition;

pub use aggregate::{derive_parent_status, BatchProgress, BatchView};
pub use manager::{Applied, CompletionOutcome, LifecycleError, LifecycleManager};
pub use transition::{check_transition, TransitionCheck, TransitionError};
