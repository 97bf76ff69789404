//! LLM integration.
//!
//! - `provider`: chat types and the [`ChatClient`] seam
//! - `openrouter`: HTTP client for OpenRouter
//! - `retry`: bounded backoff around a single model
//! - `fallback`: walks candidate models on unavailability
//! - `prompts`: translation and README analysis prompts

pub mod fallback;
pub mod openrouter;
pub mod prompts;
pub mod provider;
pub mod retry;

pub use fallback::ModelFallback;
pub use openrouter::OpenRouterClient;
pub use prompts::{ReadmeAnalysis, build_readme_analysis_prompt, build_translation_prompt};
pub use provider::*;
pub use retry::{RetryPolicy, with_retry};
