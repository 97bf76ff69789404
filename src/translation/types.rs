//! Translation task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue payload for one translation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub task_id: Uuid,
    pub user_id: String,
    pub repository_id: String,
    /// Overrides the task's own language list when non-empty.
    #[serde(default)]
    pub target_languages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Every Markdown file in the repository.
    #[default]
    Full,
    /// Only the task's `changed_files`.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A request to translate one repository into a set of languages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationTask {
    pub id: Uuid,
    pub user_id: String,
    pub repository_id: String,
    pub base_language: String,
    pub target_languages: Vec<String>,
    pub kind: TaskKind,
    /// Files to translate for incremental tasks.
    #[serde(default)]
    pub changed_files: Vec<String>,
    pub preferred_model: Option<String>,
    pub status: TaskStatus,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    /// 0-100.
    pub progress: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationTask {
    pub fn new(
        user_id: impl Into<String>,
        repository_id: impl Into<String>,
        target_languages: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            repository_id: repository_id.into(),
            base_language: "en".to_string(),
            target_languages,
            kind: TaskKind::Full,
            changed_files: Vec::new(),
            preferred_model: None,
            status: TaskStatus::Pending,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            progress: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_base_language(mut self, base_language: impl Into<String>) -> Self {
        self.base_language = base_language.into();
        self
    }

    pub fn with_changed_files(mut self, files: Vec<String>) -> Self {
        self.kind = TaskKind::Incremental;
        self.changed_files = files;
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    /// Queue payload for this task.
    pub fn job(&self) -> TranslationJob {
        TranslationJob {
            task_id: self.id,
            user_id: self.user_id.clone(),
            repository_id: self.repository_id.clone(),
            target_languages: self.target_languages.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Success,
    Failed,
}

/// Outcome of translating one file into one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedFile {
    pub task_id: Uuid,
    pub source_path: String,
    pub target_language: String,
    pub target_path: String,
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Counters after a file result was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    pub progress: u8,
}

impl TaskProgress {
    /// Percentage of processed files, capped at 100.
    pub fn percent(total: u32, completed: u32, failed: u32) -> u8 {
        if total == 0 {
            return 0;
        }
        let done = u64::from(completed) + u64::from(failed);
        (done * 100 / u64::from(total)).min(100) as u8
    }
}

/// Result value of a finished translation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    pub readme_updated: bool,
}
