//! Collaborator traits the translation engine depends on.
//!
//! `TaskStore` owns task records, per-file outcomes and daily usage; `RepositoryFiles`
//! reads and writes the repository being translated.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use uuid::Uuid;

use crate::error::StoreError;
use crate::translation::types::{
    FileStatus, TaskProgress, TaskStatus, TranslatedFile, TranslationTask,
};

/// Persistence for translation tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // ── Tasks ───────────────────────────────────────────────────────

    async fn create_task(&self, task: &TranslationTask) -> Result<(), StoreError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<TranslationTask>, StoreError>;

    /// Set the task status, replacing the error message. A task that already
    /// reached a terminal status keeps it. Returns the status in effect after
    /// the call.
    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<TaskStatus, StoreError>;

    async fn set_total_files(&self, id: Uuid, total: u32) -> Result<(), StoreError>;

    /// Atomically bump the completed or failed counter and recompute progress.
    async fn record_file_result(&self, id: Uuid, success: bool) -> Result<TaskProgress, StoreError>;

    // ── Translated files ────────────────────────────────────────────

    /// Insert or update the outcome keyed by (task, source path, language).
    async fn upsert_translated_file(
        &self,
        task_id: Uuid,
        source_path: &str,
        target_language: &str,
        target_path: &str,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn list_translated_files(&self, task_id: Uuid) -> Result<Vec<TranslatedFile>, StoreError>;

    // ── Users ───────────────────────────────────────────────────────

    /// The user's own provider key, if they configured one.
    async fn api_key_for_user(&self, user_id: &str) -> Result<Option<SecretString>, StoreError>;

    // ── Usage ───────────────────────────────────────────────────────

    /// Tasks counted against the user on `date`.
    async fn daily_usage(&self, user_id: &str, date: NaiveDate) -> Result<u32, StoreError>;

    /// Count one task against the user on `date` unless the count already
    /// reached `limit`. Returns the new count, or `None` when refused.
    async fn try_increment_usage(
        &self,
        user_id: &str,
        date: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>, StoreError>;
}

/// Access to the files of a repository checkout.
#[async_trait]
pub trait RepositoryFiles: Send + Sync {
    /// Relative paths (with `/` separators) of every Markdown file.
    async fn list_markdown_files(&self, repository_id: &str) -> Result<Vec<String>, StoreError>;

    async fn read_file(&self, repository_id: &str, path: &str) -> Result<String, StoreError>;

    /// Write `content` to `path`, creating parent directories.
    async fn write_file(&self, repository_id: &str, path: &str, content: &str) -> Result<(), StoreError>;
}
