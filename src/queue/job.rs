//! Job records and lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One unit of queued work and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Job<T, R> {
    pub id: Uuid,
    pub data: T,
    pub status: JobStatus,
    pub result: Option<R>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl<T, R> Job<T, R> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the terminal outcome.
    pub(crate) fn finish(&mut self, outcome: Result<R, String>) {
        match outcome {
            Ok(result) => {
                self.status = JobStatus::Completed;
                self.result = Some(result);
            }
            Err(error) => {
                self.status = JobStatus::Failed;
                self.error = Some(error);
            }
        }
        self.completed_at = Some(Utc::now());
    }
}

/// Lifecycle notification broadcast by the queue.
#[derive(Debug, Clone)]
pub enum JobEvent<T, R> {
    /// The job was dispatched to the processor.
    Active(Job<T, R>),
    Completed(Job<T, R>),
    Failed(Job<T, R>),
}

impl<T, R> JobEvent<T, R> {
    pub fn job(&self) -> &Job<T, R> {
        match self {
            Self::Active(job) | Self::Completed(job) | Self::Failed(job) => job,
        }
    }
}
