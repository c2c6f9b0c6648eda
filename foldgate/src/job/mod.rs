//! Job data model.
//!
//! A job is the central entity of the orchestrator: a unit of requested
//! prediction work and its tracked state. Jobs come in three shapes:
//!
//! - **Individual**: one prediction, dispatched as a single unit of work.
//! - **Batch parent**: a group submission; never dispatched itself, its
//!   status is derived from its children.
//! - **Batch child**: one member of a batch, dispatched independently and
//!   holding a weak reference to its parent.
//!
//! Status transitions are monotonic: once a job reaches a terminal state
//! (`Completed`, `Failed`, `Cancelled`) it never regresses. All status
//! writes flow through [`crate::lifecycle::LifecycleManager`]; no other
//! component mutates a record's status directly.

mod id;
mod input;
mod record;
mod status;

pub use id::JobId;
pub use input::{JobInput, TaskKind};
pub use record::JobRecord;
pub use status::{JobKind, JobStatus};
