use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::context::ErrorDescriptor;
use super::flow_definition::{FlowId, NodeKind};
use crate::error::ErrorKind;
use crate::CoreError;

/// Value object: Job ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh id
    pub fn new() -> Self {
        JobId(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Submitted,
    /// Being traversed
    Running,
    /// Finished successfully
    Completed,
    /// Finished with a failure
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl JobStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Submitted, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Submitted, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check a transition, returning a `TransitionError` if illegal
    pub fn check_transition(self, next: JobStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::TransitionError(format!(
                "Illegal job status transition {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// A node visited during traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedNode {
    /// Node id
    pub node_id: String,
    /// Node type
    pub kind: NodeKind,
    /// Whether the node succeeded
    pub success: bool,
    /// When the node resolved
    pub timestamp: DateTime<Utc>,
}

/// Result persisted with a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Output map returned to the caller
    pub output: Map<String, Value>,
    /// Variables at the end of traversal
    pub variables: Map<String, Value>,
    /// Recorded errors
    pub errors: Vec<ErrorDescriptor>,
    /// Visited nodes in resolution order
    pub visited: Vec<VisitedNode>,
    /// Size of the serialized output in bytes
    pub output_size: usize,
    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
}

/// Aggregate: a tracked invocation of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier
    pub id: JobId,

    /// Flow being run
    pub flow_id: FlowId,

    /// Current status
    pub status: JobStatus,

    /// Input payload
    pub input: Map<String, Value>,

    /// Result payload, also kept for failed jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Error message if the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Error class that failed the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ErrorKind>,

    /// Worker that ran the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    /// Number of retries leading to this job
    pub retry_count: u32,

    /// Job this one retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Start timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completion timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new submitted job
    pub fn new(flow_id: FlowId, input: Map<String, Value>) -> Self {
        Self {
            id: JobId::new(),
            flow_id,
            status: JobStatus::Submitted,
            input,
            result: None,
            error_message: None,
            failure_kind: None,
            worker_id: None,
            retry_count: 0,
            retry_of: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A new submitted job retrying this one
    pub fn retry(&self) -> Self {
        let mut job = Job::new(self.flow_id.clone(), self.input.clone());
        job.retry_count = self.retry_count + 1;
        job.retry_of = Some(self.id.clone());
        job
    }

    /// Apply a status transition and stamp the matching timestamp
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        self.status.check_transition(next)?;
        let now = Utc::now();
        match next {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(now)
            }
            JobStatus::Submitted => {}
        }
        self.status = next;
        Ok(())
    }
}

/// One entry of a job's audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Level name
    pub level: String,
    /// Component that wrote the entry
    pub component: String,
    /// Message
    pub message: String,
}

impl JobLogEntry {
    /// Create an entry stamped now
    pub fn new(level: &str, component: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            component: component.to_string(),
            message: message.into(),
        }
    }
}

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for work
    Idle,
    /// Running a job
    Busy,
}

/// Snapshot of a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    /// Worker id
    pub worker_id: String,
    /// State
    pub state: WorkerState,
    /// Job being run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<JobId>,
    /// Jobs finished by this worker
    pub jobs_processed: u64,
    /// Last sign of life
    pub last_heartbeat: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        use JobStatus::*;
        let legal = [
            (Submitted, Running),
            (Running, Completed),
            (Running, Failed),
            (Submitted, Cancelled),
            (Running, Cancelled),
        ];
        for from in [Submitted, Running, Completed, Failed, Cancelled] {
            for to in [Submitted, Running, Completed, Failed, Cancelled] {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_rejected_transition_leaves_job_unchanged() {
        let mut job = Job::new(FlowId("f".into()), Map::new());
        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        let before = job.clone();

        let err = job.transition(JobStatus::Running).unwrap_err();
        assert!(matches!(err, CoreError::TransitionError(_)));
        assert_eq!(job, before);
    }

    #[test]
    fn test_retry_links_to_original() {
        let job = Job::new(FlowId("f".into()), Map::new());
        let retry = job.retry();
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.retry_of, Some(job.id.clone()));
        assert_eq!(retry.status, JobStatus::Submitted);
        assert_ne!(retry.id, job.id);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
    }
}
