//! Error types for the translation pipeline.

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider answered with a non-success HTTP status.
    #[error("Provider returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// The model cannot serve right now; try another one.
    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String },

    #[error("All models unavailable (tried: {})", tried.join(", "))]
    AllModelsUnavailable { tried: Vec<String> },

    #[error("Invalid response from {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// HTTP status carried by a provider error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }
}

/// Job queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("No processor set for queue")]
    NoProcessor,

    #[error("Processor panicked: {0}")]
    ProcessorPanicked(String),
}

/// Persistence and repository collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Orchestration errors that abort a whole task.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    #[error("No API key available for user {user_id}")]
    MissingApiKey { user_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of one file in one language. Recorded on the file, never fatal to
/// the task.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("File too large: {chars} characters (limit {limit})")]
    TooLarge { chars: usize, limit: usize },

    #[error("Failed to read source file: {0}")]
    Read(#[source] StoreError),

    #[error("Translation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to write translation: {0}")]
    Write(#[source] StoreError),
}
