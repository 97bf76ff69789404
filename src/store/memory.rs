//! In-memory `TaskStore`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::translation::types::{
    FileStatus, TaskProgress, TaskStatus, TranslatedFile, TranslationTask,
};

use super::traits::TaskStore;

type FileKey = (Uuid, String, String);
type UsageKey = (String, NaiveDate);

/// Task store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<Uuid, TranslationTask>>,
    files: RwLock<HashMap<FileKey, TranslatedFile>>,
    api_keys: RwLock<HashMap<String, SecretString>>,
    usage: RwLock<HashMap<UsageKey, u32>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's own provider key.
    pub async fn set_api_key(&self, user_id: impl Into<String>, key: SecretString) {
        self.api_keys.write().await.insert(user_id.into(), key);
    }
}

fn task_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "translation_task".to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, task: &TranslationTask) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TranslationTask>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<TaskStatus, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or_else(|| task_not_found(id))?;
        if task.status.is_terminal() {
            return Ok(task.status);
        }
        task.status = status;
        task.error_message = error_message.map(str::to_string);
        task.updated_at = Utc::now();
        Ok(status)
    }

    async fn set_total_files(&self, id: Uuid, total: u32) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or_else(|| task_not_found(id))?;
        task.total_files = total;
        task.progress = TaskProgress::percent(total, task.completed_files, task.failed_files);
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn record_file_result(&self, id: Uuid, success: bool) -> Result<TaskProgress, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or_else(|| task_not_found(id))?;
        if success {
            task.completed_files += 1;
        } else {
            task.failed_files += 1;
        }
        task.progress = TaskProgress::percent(task.total_files, task.completed_files, task.failed_files);
        task.updated_at = Utc::now();

        Ok(TaskProgress {
            total_files: task.total_files,
            completed_files: task.completed_files,
            failed_files: task.failed_files,
            progress: task.progress,
        })
    }

    async fn upsert_translated_file(
        &self,
        task_id: Uuid,
        source_path: &str,
        target_language: &str,
        target_path: &str,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let key = (task_id, source_path.to_string(), target_language.to_string());
        self.files.write().await.insert(
            key,
            TranslatedFile {
                task_id,
                source_path: source_path.to_string(),
                target_language: target_language.to_string(),
                target_path: target_path.to_string(),
                status,
                error_message: error_message.map(str::to_string),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_translated_files(&self, task_id: Uuid) -> Result<Vec<TranslatedFile>, StoreError> {
        let mut files: Vec<_> = self
            .files
            .read()
            .await
            .values()
            .filter(|f| f.task_id == task_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| {
            (&a.target_language, &a.source_path).cmp(&(&b.target_language, &b.source_path))
        });
        Ok(files)
    }

    async fn api_key_for_user(&self, user_id: &str) -> Result<Option<SecretString>, StoreError> {
        Ok(self.api_keys.read().await.get(user_id).cloned())
    }

    async fn daily_usage(&self, user_id: &str, date: NaiveDate) -> Result<u32, StoreError> {
        let key = (user_id.to_string(), date);
        Ok(self.usage.read().await.get(&key).copied().unwrap_or(0))
    }

    async fn try_increment_usage(
        &self,
        user_id: &str,
        date: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>, StoreError> {
        let mut usage = self.usage.write().await;
        let count = usage.entry((user_id.to_string(), date)).or_insert(0);
        if *count >= limit {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }
}
