//! Model fallback: walks an ordered candidate list until one model answers.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::LlmError;

use super::prompts::{
    ReadmeAnalysis, build_readme_analysis_prompt, build_translation_prompt, parse_readme_analysis,
};
use super::provider::ChatClient;
use super::retry::{RetryPolicy, with_retry};

/// Translates through a chat client, switching models on unavailability.
pub struct ModelFallback {
    client: Arc<dyn ChatClient>,
    priority: Vec<String>,
    retry: RetryPolicy,
}

impl ModelFallback {
    /// `priority` is the fixed fallback order, normally from configuration.
    pub fn new(client: Arc<dyn ChatClient>, priority: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            priority,
            retry,
        }
    }

    /// Candidate order: `preferred` first, then the priority list without it.
    pub fn candidates(&self, preferred: Option<&str>) -> Vec<String> {
        match preferred.map(str::trim).filter(|m| !m.is_empty()) {
            Some(preferred) => std::iter::once(preferred.to_string())
                .chain(self.priority.iter().filter(|m| *m != preferred).cloned())
                .collect(),
            None => self.priority.clone(),
        }
    }

    /// Translate `content`, trying each candidate model in order.
    ///
    /// Only [`LlmError::ModelUnavailable`] advances to the next candidate; any
    /// other failure is returned immediately.
    pub async fn translate_with_fallback(
        &self,
        content: &str,
        source_language: &str,
        target_language: &str,
        api_key: &SecretString,
        preferred_model: Option<&str>,
    ) -> Result<String, LlmError> {
        let candidates = self.candidates(preferred_model);
        let mut tried = Vec::with_capacity(candidates.len());

        for model in candidates {
            let request = build_translation_prompt(content, source_language, target_language, &model);

            match with_retry(&self.retry, || self.client.create_chat_completion(&request, api_key)).await {
                Ok(response) => {
                    let translated = response.first_content().ok_or_else(|| {
                        LlmError::InvalidResponse {
                            model: model.clone(),
                            reason: "response contained no choices".to_string(),
                        }
                    })?;
                    debug!(
                        model = %model,
                        target = target_language,
                        chars = translated.len(),
                        "Translation succeeded"
                    );
                    return Ok(translated.to_string());
                }
                Err(e) if e.is_model_unavailable() => {
                    warn!(model = %model, error = %e, "Model unavailable, trying next");
                    tried.push(model);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::AllModelsUnavailable { tried })
    }

    /// Ask a model where the language switcher belongs in `content`.
    ///
    /// Transport and provider failures are returned; a malformed answer is
    /// not an error and yields [`ReadmeAnalysis::fallback`].
    pub async fn analyze_readme(
        &self,
        content: &str,
        api_key: &SecretString,
        preferred_model: Option<&str>,
    ) -> Result<ReadmeAnalysis, LlmError> {
        let candidates = self.candidates(preferred_model);
        let Some(model) = candidates.first() else {
            return Err(LlmError::AllModelsUnavailable { tried: Vec::new() });
        };

        let request = build_readme_analysis_prompt(content, model);
        let response =
            with_retry(&self.retry, || self.client.create_chat_completion(&request, api_key)).await?;

        let line_count = content.split('\n').count();
        let raw = response.first_content().unwrap_or_default();
        match parse_readme_analysis(raw, line_count) {
            Ok(analysis) => {
                info!(model = %model, position = analysis.position, reason = %analysis.reason, "README analysis");
                Ok(analysis)
            }
            Err(e) => {
                warn!(model = %model, error = %e, raw_response = %raw, "Unusable README analysis, using line 0");
                Ok(ReadmeAnalysis::fallback())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::provider::{ChatRequest, ChatResponse, Choice, ChoiceMessage};

    /// Per-model scripted behaviour: an HTTP status to fail with, or content.
    #[derive(Clone)]
    enum Script {
        Fail(u16),
        Reply(&'static str),
    }

    struct ScriptedClient {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(m, s)| (m.to_string(), s.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn reply(content: &str) -> ChatResponse {
        ChatResponse {
            id: "resp".into(),
            model: "m".into(),
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: "assistant".into(),
                    content: content.into(),
                },
                finish_reason: Some("stop".into()),
            }],
            usage: None,
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn create_chat_completion(
            &self,
            request: &ChatRequest,
            _api_key: &SecretString,
        ) -> Result<ChatResponse, LlmError> {
            self.calls.lock().unwrap().push(request.model.clone());
            match self.scripts.get(&request.model) {
                Some(Script::Reply(content)) => Ok(reply(content)),
                Some(Script::Fail(status)) => Err(LlmError::Api {
                    status: *status,
                    message: "scripted failure".into(),
                    body: None,
                }),
                None => panic!("unexpected model {}", request.model),
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn selector(client: Arc<ScriptedClient>, priority: &[&str]) -> ModelFallback {
        ModelFallback::new(
            client,
            priority.iter().map(|m| m.to_string()).collect(),
            fast_retry(),
        )
    }

    fn key() -> SecretString {
        SecretString::from("sk-test")
    }

    #[test]
    fn candidates_put_preferred_first_without_duplicates() {
        let fallback = selector(ScriptedClient::new(&[]), &["a", "b", "c"]);
        assert_eq!(fallback.candidates(None), vec!["a", "b", "c"]);
        assert_eq!(fallback.candidates(Some("b")), vec!["b", "a", "c"]);
        assert_eq!(fallback.candidates(Some("z")), vec!["z", "a", "b", "c"]);
        assert_eq!(fallback.candidates(Some("  ")), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stops_at_first_available_model() {
        let client = ScriptedClient::new(&[
            ("a", Script::Fail(503)),
            ("b", Script::Reply("hello")),
            ("c", Script::Reply("never")),
        ]);
        let fallback = selector(client.clone(), &["a", "b", "c"]);

        let text = fallback
            .translate_with_fallback("hola", "es", "en", &key(), None)
            .await
            .unwrap();

        assert_eq!(text, "hello");
        assert_eq!(client.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn exhaustion_tries_each_candidate_once() {
        let client = ScriptedClient::new(&[
            ("a", Script::Fail(503)),
            ("b", Script::Fail(503)),
            ("c", Script::Fail(503)),
        ]);
        let fallback = selector(client.clone(), &["a", "b", "c"]);

        let err = fallback
            .translate_with_fallback("hola", "es", "en", &key(), None)
            .await
            .unwrap_err();

        match err {
            LlmError::AllModelsUnavailable { tried } => assert_eq!(tried, vec!["a", "b", "c"]),
            other => panic!("expected AllModelsUnavailable, got {other:?}"),
        }
        assert_eq!(client.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn auth_failure_aborts_without_fallback() {
        let client = ScriptedClient::new(&[("a", Script::Fail(401)), ("b", Script::Reply("x"))]);
        let fallback = selector(client.clone(), &["a", "b"]);

        let err = fallback
            .translate_with_fallback("hola", "es", "en", &key(), None)
            .await
            .unwrap_err();

        assert!(err.is_auth_failure());
        assert_eq!(client.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn generic_failure_exhausts_retries_then_propagates() {
        let client = ScriptedClient::new(&[("a", Script::Fail(500)), ("b", Script::Reply("x"))]);
        let fallback = selector(client.clone(), &["a", "b"]);

        let err = fallback
            .translate_with_fallback("hola", "es", "en", &key(), None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(client.calls(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn preferred_model_is_tried_first() {
        let client = ScriptedClient::new(&[("b", Script::Reply("from b"))]);
        let fallback = selector(client.clone(), &["a", "b"]);

        let text = fallback
            .translate_with_fallback("hola", "es", "en", &key(), Some("b"))
            .await
            .unwrap();

        assert_eq!(text, "from b");
        assert_eq!(client.calls(), vec!["b"]);
    }

    #[tokio::test]
    async fn analysis_parses_valid_answer() {
        let client = ScriptedClient::new(&[("a", Script::Reply(r#"{"position": 2, "reason": "after title"}"#))]);
        let fallback = selector(client, &["a"]);

        let analysis = fallback
            .analyze_readme("# T\n\nbody\n", &key(), None)
            .await
            .unwrap();
        assert_eq!(analysis.position, 2);
    }

    #[tokio::test]
    async fn analysis_falls_back_on_garbage() {
        let client = ScriptedClient::new(&[("a", Script::Reply("I would put it near the top."))]);
        let fallback = selector(client, &["a"]);

        let analysis = fallback.analyze_readme("# T\n", &key(), None).await.unwrap();
        assert_eq!(analysis, ReadmeAnalysis::fallback());
    }
}
