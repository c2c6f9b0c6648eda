//! Pure state-machine transition checking.

use crate::job::JobStatus;
use thiserror::Error;

/// Outcome of checking a requested transition against the current status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The transition is valid and should be written.
    Apply,

    /// The job already reached the requested terminal state (or another
    /// terminal state via a racing writer). Nothing to write.
    Duplicate,
}

/// A requested transition that the state machine rejects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested move is not an edge of the state machine.
    #[error("invalid transition {from} -> {to}")]
    Invalid { from: JobStatus, to: JobStatus },
}

/// Checks whether `to` may be applied on a job currently at `from`.
///
/// Duplicate terminal deliveries are expected (webhook retries, webhook
/// racing the reconciler) and resolve to [`TransitionCheck::Duplicate`]
/// rather than an error: the caller acknowledges without writing.
///
/// A non-terminal self-transition (e.g. a second `Running` signal) is also
/// a duplicate: harmless, nothing to write.
pub fn check_transition(from: JobStatus, to: JobStatus) -> Result<TransitionCheck, TransitionError> {
    if from == to {
        return Ok(TransitionCheck::Duplicate);
    }
    if from.is_terminal() {
        if to.is_terminal() {
            // First terminal writer won; this delivery is a no-op.
            return Ok(TransitionCheck::Duplicate);
        }
        return Err(TransitionError::Invalid { from, to });
    }
    if from.can_transition_to(to) {
        Ok(TransitionCheck::Apply)
    } else {
        Err(TransitionError::Invalid { from, to })
    }
}
