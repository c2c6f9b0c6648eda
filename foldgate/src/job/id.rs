//! Opaque job identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a job.
///
/// Job IDs are opaque strings generated at record creation. Callers should
/// treat them as tokens: the format is not part of the API contract.
///
/// # Example
///
/// ```
/// use foldgate::job::JobId;
///
/// let id = JobId::generate();
/// assert!(!id.as_str().is_empty());
/// ```
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID from an existing string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh unique job ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_new() {
        let id = JobId::new("job-123");
        assert_eq!(id.as_str(), "job-123");
    }

    #[test]
    fn test_job_id_generate_unique() {
        let id1 = JobId::generate();
        let id2 = JobId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::new("my-job");
        assert_eq!(format!("{}", id), "my-job");
    }

    #[test]
    fn test_job_id_from_str() {
        let id: JobId = "from-str".into();
        assert_eq!(id.as_str(), "from-str");
    }
}
