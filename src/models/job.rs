//! Embedding job lifecycle data.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::EntityKind;

/// Job lifecycle status.
///
/// `Completed` and `Failed` are terminal; everything else transitions
/// through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// One entity's trip through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub status: JobStatus,
    pub retries: u32,
    pub created_at: String,
    pub last_processed_at: Option<String>,
    /// Present only when the job has failed; recorded verbatim.
    pub error: Option<String>,
}

impl EmbeddingJob {
    pub fn new(entity_id: impl Into<String>, entity_kind: EntityKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            entity_kind,
            status: JobStatus::Pending,
            retries: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_processed_at: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = EmbeddingJob::new("e1", EntityKind::Document);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 0);
        assert!(job.error.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
