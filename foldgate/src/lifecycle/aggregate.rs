//! Batch parent aggregation.
//!
//! A batch parent's status is a pure function of its children's statuses.
//! Progress excludes cancelled children from the denominator: a cancelled
//! member represents work the user withdrew, not work that can still
//! succeed or fail, so it neither holds the ratio down nor counts toward
//! completion.

use crate::job::{JobRecord, JobStatus};
use serde::{Deserialize, Serialize};

/// Child status tallies for a batch parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Total number of children.
    pub total: usize,

    /// Children still awaiting dispatch.
    pub pending: usize,

    /// Children in flight at the provider (submitted or running).
    pub in_flight: usize,

    /// Children that completed successfully.
    pub completed: usize,

    /// Children that failed.
    pub failed: usize,

    /// Children that were cancelled.
    pub cancelled: usize,
}

impl BatchProgress {
    /// Tallies child records.
    pub fn from_children<'a>(children: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut progress = Self::default();
        for child in children {
            progress.total += 1;
            match child.status {
                JobStatus::Pending => progress.pending += 1,
                JobStatus::Submitted | JobStatus::Running => progress.in_flight += 1,
                JobStatus::Completed => progress.completed += 1,
                JobStatus::Failed => progress.failed += 1,
                JobStatus::Cancelled => progress.cancelled += 1,
            }
        }
        progress
    }

    /// Number of children in a terminal state.
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Returns true if every child is terminal.
    pub fn all_terminal(&self) -> bool {
        self.terminal() == self.total
    }

    /// Completion ratio: `completed / (total - cancelled)`.
    ///
    /// Cancelled children are excluded from the denominator. A batch whose
    /// every member was cancelled has no measurable work left and reports
    /// 0.0.
    pub fn ratio(&self) -> f64 {
        let denominator = self.total - self.cancelled;
        if denominator == 0 {
            0.0
        } else {
            self.completed as f64 / denominator as f64
        }
    }
}

/// Derives a batch parent's status from its children's tallies.
///
/// - `Completed` iff all children are terminal and at least one completed.
/// - `Failed` iff all children are terminal and none completed.
/// - `Running` while any child is in flight at the provider.
/// - `Pending` otherwise (children exist but none dispatched yet).
///
/// An empty batch cannot occur through classification; it derives as
/// `Pending`.
pub fn derive_parent_status(progress: &BatchProgress) -> JobStatus {
    if progress.total == 0 {
        return JobStatus::Pending;
    }
    if progress.all_terminal() {
        if progress.completed > 0 {
            return JobStatus::Completed;
        }
        return JobStatus::Failed;
    }
    if progress.in_flight > 0 {
        return JobStatus::Running;
    }
    JobStatus::Pending
}

/// A batch parent together with its children and derived progress, as
/// served to consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchView {
    /// The parent record.
    pub parent: JobRecord,

    /// All child records, creation order.
    pub children: Vec<JobRecord>,

    /// Derived tallies over `children`.
    pub progress: BatchProgress,
}

impl BatchView {
    /// Builds a view, computing progress from the given children.
    pub fn new(parent: JobRecord, children: Vec<JobRecord>) -> Self {
        let progress = BatchProgress::from_children(&children);
        Self {
            parent,
            children,
            progress,
        }
    }
}
