//! Translation engine: runs one queued translation task end to end.
//!
//! For every (file, language) pair the engine reads the source, translates it
//! through the model fallback chain, writes the result under
//! `translations/{lang}/` and records the outcome. A failed file never aborts
//! the task. Once all pairs are done the root README gets a language switcher
//! linking the languages whose README translation succeeded.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::FreeTierLimits;
use crate::error::{EngineError, FileError, StoreError};
use crate::llm::ModelFallback;
use crate::queue::JobQueue;
use crate::store::{RepositoryFiles, TaskStore};

use super::path::get_translated_path;
use super::readme::{
    has_language_links, insert_language_links, insert_language_links_at, remove_language_links,
};
use super::types::{FileStatus, TaskKind, TaskStatus, TaskSummary, TranslationJob, TranslationTask};

/// Queue carrying translation jobs to the engine.
pub type TranslationQueue = JobQueue<TranslationJob, TaskSummary>;

const ROOT_README: &str = "README.md";

/// How the README switcher position is chosen when the README has none yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadmePlacement {
    /// Fixed heading-based rules.
    #[default]
    Heuristic,
    /// Ask a model, falling back to the heuristic on errors.
    Model,
}

impl FromStr for ReadmePlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "model" => Ok(Self::Model),
            other => Err(format!("expected \"heuristic\" or \"model\", got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Applied to users running on the platform key. `None` disables them.
    pub free_tier: Option<FreeTierLimits>,
    pub readme_placement: ReadmePlacement,
}

/// Per-language tally used to derive the final task status.
#[derive(Debug, Default)]
struct LanguageTally {
    attempted: u32,
    succeeded: u32,
}

/// Orchestrates translation tasks.
pub struct TranslationEngine {
    fallback: Arc<ModelFallback>,
    store: Arc<dyn TaskStore>,
    repo: Arc<dyn RepositoryFiles>,
    config: EngineConfig,
    platform_api_key: Option<SecretString>,
}

impl TranslationEngine {
    pub fn new(
        fallback: Arc<ModelFallback>,
        store: Arc<dyn TaskStore>,
        repo: Arc<dyn RepositoryFiles>,
        config: EngineConfig,
        platform_api_key: Option<SecretString>,
    ) -> Self {
        Self {
            fallback,
            store,
            repo,
            config,
            platform_api_key,
        }
    }

    /// Install this engine as the queue's processor.
    pub fn attach(self: Arc<Self>, queue: &TranslationQueue) {
        queue.set_processor(move |job: TranslationJob| {
            let engine = Arc::clone(&self);
            async move { engine.execute(job).await.map_err(anyhow::Error::from) }
        });
    }

    /// Run one task. Per-file failures are recorded and folded into the final
    /// status; only task-level problems return an error.
    pub async fn execute(&self, job: TranslationJob) -> Result<TaskSummary, EngineError> {
        let task = self
            .store
            .get_task(job.task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(job.task_id))?;

        if task.status == TaskStatus::Cancelled {
            info!(task_id = %task.id, "Task cancelled before start, skipping");
            return Ok(TaskSummary {
                task_id: task.id,
                status: TaskStatus::Cancelled,
                total_files: task.total_files,
                completed_files: task.completed_files,
                failed_files: task.failed_files,
                readme_updated: false,
            });
        }

        match self.run(&job, &task).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Translation task aborted");
                self.mark_failed(task.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run(&self, job: &TranslationJob, task: &TranslationTask) -> Result<TaskSummary, EngineError> {
        let (api_key, own_key) = self.resolve_api_key(&job.user_id).await?;
        let limits = if own_key { None } else { self.config.free_tier };

        let status = self
            .store
            .update_task_status(task.id, TaskStatus::Running, None)
            .await?;
        if status != TaskStatus::Running {
            info!(task_id = %task.id, status = %status, "Task left pending state before start, skipping");
            return Ok(TaskSummary {
                task_id: task.id,
                status,
                total_files: task.total_files,
                completed_files: task.completed_files,
                failed_files: task.failed_files,
                readme_updated: false,
            });
        }

        let mut files = self.collect_files(task, &job.repository_id).await?;
        if let Some(limits) = limits
            && files.len() > limits.files_per_task
        {
            // The root README goes first so the switcher can still be built.
            files.sort_by_key(|f| !f.eq_ignore_ascii_case(ROOT_README));
            warn!(
                task_id = %task.id,
                files = files.len(),
                limit = limits.files_per_task,
                "Free tier file limit reached, skipping the rest"
            );
            files.truncate(limits.files_per_task);
        }
        let requested = if job.target_languages.is_empty() {
            &task.target_languages
        } else {
            &job.target_languages
        };
        let languages = dedup(requested.iter().filter(|l| **l != task.base_language));

        let total = u32::try_from(files.len() * languages.len()).unwrap_or(u32::MAX);
        self.store.set_total_files(task.id, total).await?;

        info!(
            task_id = %task.id,
            repository_id = %job.repository_id,
            files = files.len(),
            languages = ?languages,
            "Starting translation task"
        );

        let preferred = task.preferred_model.as_deref();
        let root_readme = files.iter().find(|f| f.eq_ignore_ascii_case(ROOT_README)).cloned();
        let mut tallies: Vec<(String, LanguageTally)> = Vec::with_capacity(languages.len());
        let mut readme_languages = Vec::new();
        let mut completed = 0u32;
        let mut failed = 0u32;
        let mut cancelled = false;

        'languages: for language in &languages {
            let mut tally = LanguageTally::default();

            for source_path in &files {
                if self.is_cancelled(task.id).await {
                    cancelled = true;
                    break 'languages;
                }

                let target_path = get_translated_path(source_path, language);
                self.store
                    .upsert_translated_file(task.id, source_path, language, &target_path, FileStatus::Pending, None)
                    .await?;

                tally.attempted += 1;
                let outcome = self
                    .translate_file(
                        &job.repository_id,
                        source_path,
                        &target_path,
                        &task.base_language,
                        language,
                        &api_key,
                        preferred,
                        limits.map(|l| l.chars_per_file),
                    )
                    .await;

                match outcome {
                    Ok(()) => {
                        self.store
                            .upsert_translated_file(
                                task.id,
                                source_path,
                                language,
                                &target_path,
                                FileStatus::Success,
                                None,
                            )
                            .await?;
                        let progress = self.store.record_file_result(task.id, true).await?;
                        tally.succeeded += 1;
                        completed += 1;
                        if root_readme.as_deref() == Some(source_path.as_str()) {
                            readme_languages.push(language.clone());
                        }
                        debug!(
                            task_id = %task.id,
                            file = %source_path,
                            language = %language,
                            progress = progress.progress,
                            "File translated"
                        );
                    }
                    Err(e) => {
                        let message = e.to_string();
                        warn!(
                            task_id = %task.id,
                            file = %source_path,
                            language = %language,
                            error = %message,
                            "File translation failed"
                        );
                        self.store
                            .upsert_translated_file(
                                task.id,
                                source_path,
                                language,
                                &target_path,
                                FileStatus::Failed,
                                Some(&message),
                            )
                            .await?;
                        self.store.record_file_result(task.id, false).await?;
                        failed += 1;
                    }
                }
            }

            tallies.push((language.clone(), tally));
        }

        let mut summary = TaskSummary {
            task_id: task.id,
            status: TaskStatus::Cancelled,
            total_files: total,
            completed_files: completed,
            failed_files: failed,
            readme_updated: false,
        };

        if cancelled || self.is_cancelled(task.id).await {
            info!(task_id = %task.id, completed, failed, "Task cancelled mid-run");
            return Ok(summary);
        }

        if let Some(readme) = &root_readme
            && !readme_languages.is_empty()
        {
            summary.readme_updated = match self
                .update_readme(&job.repository_id, readme, &readme_languages, &api_key, preferred)
                .await
            {
                Ok(updated) => updated,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Failed to update README language links");
                    false
                }
            };
        }

        let failed_languages: Vec<&str> = tallies
            .iter()
            .filter(|(_, t)| t.attempted > 0 && t.succeeded == 0)
            .map(|(lang, _)| lang.as_str())
            .collect();

        summary.status = if failed_languages.is_empty() {
            self.store
                .update_task_status(task.id, TaskStatus::Completed, None)
                .await?
        } else {
            let message = format!("No files translated for: {}", failed_languages.join(", "));
            self.store
                .update_task_status(task.id, TaskStatus::Failed, Some(&message))
                .await?
        };

        info!(
            task_id = %task.id,
            status = %summary.status,
            completed,
            failed,
            readme_updated = summary.readme_updated,
            "Translation task finished"
        );
        Ok(summary)
    }

    /// The user's own key wins over the platform key. The flag tells whether
    /// the key belongs to the user.
    async fn resolve_api_key(&self, user_id: &str) -> Result<(SecretString, bool), EngineError> {
        if let Some(key) = self.store.api_key_for_user(user_id).await? {
            return Ok((key, true));
        }
        self.platform_api_key
            .clone()
            .map(|key| (key, false))
            .ok_or_else(|| EngineError::MissingApiKey {
                user_id: user_id.to_string(),
            })
    }

    async fn collect_files(&self, task: &TranslationTask, repository_id: &str) -> Result<Vec<String>, StoreError> {
        let files = match task.kind {
            TaskKind::Full => self.repo.list_markdown_files(repository_id).await?,
            TaskKind::Incremental => task
                .changed_files
                .iter()
                .filter(|f| is_markdown_path(f))
                .cloned()
                .collect(),
        };
        Ok(dedup(files.iter()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn translate_file(
        &self,
        repository_id: &str,
        source_path: &str,
        target_path: &str,
        source_language: &str,
        target_language: &str,
        api_key: &SecretString,
        preferred_model: Option<&str>,
        max_chars: Option<usize>,
    ) -> Result<(), FileError> {
        let mut content = self
            .repo
            .read_file(repository_id, source_path)
            .await
            .map_err(FileError::Read)?;

        if is_readme_path(source_path) {
            content = remove_language_links(&content);
        }

        if let Some(limit) = max_chars {
            let chars = content.chars().count();
            if chars > limit {
                return Err(FileError::TooLarge { chars, limit });
            }
        }

        let translated = self
            .fallback
            .translate_with_fallback(&content, source_language, target_language, api_key, preferred_model)
            .await?;

        self.repo
            .write_file(repository_id, target_path, &translated)
            .await
            .map_err(FileError::Write)
    }

    /// Rewrite the switcher block of the root README. Returns whether the file
    /// changed.
    async fn update_readme(
        &self,
        repository_id: &str,
        readme_path: &str,
        languages: &[String],
        api_key: &SecretString,
        preferred_model: Option<&str>,
    ) -> Result<bool, StoreError> {
        let content = self.repo.read_file(repository_id, readme_path).await?;

        let updated = match self.config.readme_placement {
            ReadmePlacement::Model if !has_language_links(&content) => {
                match self.fallback.analyze_readme(&content, api_key, preferred_model).await {
                    Ok(analysis) => insert_language_links_at(&content, languages, analysis.position),
                    Err(e) => {
                        warn!(error = %e, "README analysis failed, using heuristic placement");
                        insert_language_links(&content, languages)
                    }
                }
            }
            _ => insert_language_links(&content, languages),
        };

        if updated == content {
            return Ok(false);
        }
        self.repo.write_file(repository_id, readme_path, &updated).await?;
        info!(repository_id, languages = ?languages, "README language links updated");
        Ok(true)
    }

    async fn is_cancelled(&self, task_id: Uuid) -> bool {
        match self.store.get_task(task_id).await {
            Ok(Some(task)) => task.status == TaskStatus::Cancelled,
            Ok(None) => false,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Could not check task status");
                false
            }
        }
    }

    async fn mark_failed(&self, task_id: Uuid, message: &str) {
        if let Err(e) = self
            .store
            .update_task_status(task_id, TaskStatus::Failed, Some(message))
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to mark task as failed");
        }
    }
}

/// Order-preserving dedup.
fn dedup<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|s| seen.insert(s.as_str())).cloned().collect()
}

fn is_markdown_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

fn is_readme_path(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case(ROOT_README))
}
