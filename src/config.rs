//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::RetryPolicy;
use crate::translation::engine::{EngineConfig, ReadmePlacement};

/// Fallback order walked when a model reports itself unavailable.
pub const DEFAULT_MODEL_PRIORITY: &[&str] = &[
    "deepseek/deepseek-chat",
    "google/gemini-2.5-flash-preview",
    "qwen/qwen-turbo",
    "anthropic/claude-3.5-haiku",
    "openai/gpt-4o-mini",
];

/// OpenRouter connection settings.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub base_url: String,
    /// Sent as `HTTP-Referer` so OpenRouter can attribute traffic.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
    /// Used when a request does not set `max_tokens`.
    pub max_tokens: u32,
    /// Used when a request does not set `temperature`.
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            referer: "https://github-global.com".to_string(),
            title: "GitHub Global".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Queue sizing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { concurrency: 3 }
    }
}

/// Limits for users who translate on the platform key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeTierLimits {
    /// Tasks a user may create per UTC day.
    pub daily_tasks: u32,
    /// Files translated per task; the rest are skipped.
    pub files_per_task: usize,
    /// Longer files fail without calling a model.
    pub chars_per_file: usize,
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        Self {
            daily_tasks: 10,
            files_per_task: 5,
            chars_per_file: 50_000,
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openrouter: OpenRouterConfig,
    /// Platform-owned key, used for users without their own.
    pub platform_api_key: Option<SecretString>,
    pub retry: RetryPolicy,
    pub queue: QueueConfig,
    pub model_priority: Vec<String>,
    pub engine: EngineConfig,
    /// Directory holding one checkout per repository id.
    pub workspace_root: PathBuf,
    pub port: u16,
    /// Poll period of the progress event stream.
    pub progress_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openrouter: OpenRouterConfig::default(),
            platform_api_key: None,
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
            model_priority: default_model_priority(),
            engine: EngineConfig {
                free_tier: Some(FreeTierLimits::default()),
                ..Default::default()
            },
            workspace_root: PathBuf::from("./data/repos"),
            port: 8080,
            progress_interval: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let openrouter = OpenRouterConfig {
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openrouter.base_url),
            referer: std::env::var("GH_GLOBAL_REFERER").unwrap_or(defaults.openrouter.referer),
            title: defaults.openrouter.title,
            max_tokens: parse_var("OPENROUTER_MAX_TOKENS")?
                .unwrap_or(defaults.openrouter.max_tokens),
            temperature: parse_var("OPENROUTER_TEMPERATURE")?
                .unwrap_or(defaults.openrouter.temperature),
            timeout: parse_var("OPENROUTER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.openrouter.timeout),
        };

        let platform_api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let retry = RetryPolicy {
            max_retries: parse_var("GH_GLOBAL_RETRY_MAX")?.unwrap_or(defaults.retry.max_retries),
            base_delay: parse_var("GH_GLOBAL_RETRY_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
            max_delay: parse_var("GH_GLOBAL_RETRY_MAX_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_delay),
        };

        let concurrency: usize =
            parse_var("GH_GLOBAL_QUEUE_CONCURRENCY")?.unwrap_or(defaults.queue.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GH_GLOBAL_QUEUE_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let model_priority: Vec<String> = std::env::var("GH_GLOBAL_MODEL_PRIORITY")
            .map(|s| split_list(&s))
            .unwrap_or_default();
        let model_priority = if model_priority.is_empty() {
            defaults.model_priority
        } else {
            model_priority
        };

        let readme_placement = match std::env::var("GH_GLOBAL_README_PLACEMENT") {
            Ok(s) => s.parse().map_err(|message| ConfigError::InvalidValue {
                key: "GH_GLOBAL_README_PLACEMENT".to_string(),
                message,
            })?,
            Err(_) => ReadmePlacement::default(),
        };

        let free_tier = if parse_var("GH_GLOBAL_FREE_TIER")?.unwrap_or(true) {
            let limits = FreeTierLimits::default();
            Some(FreeTierLimits {
                daily_tasks: parse_var("GH_GLOBAL_FREE_DAILY_LIMIT")?.unwrap_or(limits.daily_tasks),
                files_per_task: parse_var("GH_GLOBAL_FREE_FILES_PER_TASK")?
                    .unwrap_or(limits.files_per_task),
                chars_per_file: parse_var("GH_GLOBAL_FREE_CHARS_PER_FILE")?
                    .unwrap_or(limits.chars_per_file),
            })
        } else {
            None
        };

        let engine = EngineConfig {
            free_tier,
            readme_placement,
        };

        Ok(Self {
            openrouter,
            platform_api_key,
            retry,
            queue: QueueConfig { concurrency },
            model_priority,
            engine,
            workspace_root: std::env::var("GH_GLOBAL_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            port: parse_var("GH_GLOBAL_PORT")?.unwrap_or(defaults.port),
            progress_interval: parse_var("GH_GLOBAL_PROGRESS_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.progress_interval),
        })
    }
}

/// The built-in fallback order as owned strings.
pub fn default_model_priority() -> Vec<String> {
    DEFAULT_MODEL_PRIORITY.iter().map(|m| m.to_string()).collect()
}

/// Read and parse an optional environment variable.
fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
