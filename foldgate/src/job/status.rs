//! Job kind and status enums with the lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape of a job, decided once at classification time.
///
/// Downstream components never re-infer shape from the payload; they branch
/// on this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// A single prediction dispatched as one unit of work.
    Individual,

    /// A group submission. Never dispatched itself; status is derived
    /// from its children.
    BatchParent,

    /// One member of a batch, dispatched independently.
    BatchChild,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual => write!(f, "INDIVIDUAL"),
            Self::BatchParent => write!(f, "BATCH_PARENT"),
            Self::BatchChild => write!(f, "BATCH_CHILD"),
        }
    }
}

/// Job execution status.
///
/// The state machine is:
///
/// ```text
/// Pending → Submitted → Running → { Completed | Failed }
/// ```
///
/// with `Cancelled` reachable from any non-terminal state. The `Running`
/// signal is optional: providers that never emit it take jobs directly from
/// `Submitted` to a terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, not yet handed to the compute provider.
    #[default]
    Pending,

    /// Accepted by the compute provider; external ref recorded.
    Submitted,

    /// Provider reported execution in progress (optional signal).
    Running,

    /// Finished with a result.
    Completed,

    /// Finished with an error.
    Failed,

    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal state.
    ///
    /// Terminal states are: Completed, Failed, Cancelled. No record
    /// regresses from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the job is still in flight (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the job has been handed to the provider and is
    /// awaiting a completion signal.
    pub fn is_in_flight_at_provider(&self) -> bool {
        matches!(self, Self::Submitted | Self::Running)
    }

    /// Returns true if `next` is a valid transition from this state.
    ///
    /// Transitions are monotonic along the state machine; `Cancelled` is
    /// reachable from any non-terminal state. Self-transitions are not
    /// valid: idempotency is handled above this predicate.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Self::Pending, Self::Submitted) => true,
            (Self::Submitted, Self::Running) => true,
            // Providers may skip the Running signal entirely.
            (Self::Submitted | Self::Running, Self::Completed | Self::Failed) => true,
            // Dispatch-stage failure before the provider accepted the unit.
            (Self::Pending, Self::Failed) => true,
            (_, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
