//! Prompt construction for translation and README structure analysis.

use serde::Deserialize;

use super::provider::{ChatMessage, ChatRequest};

/// Low temperature keeps documentation translation literal.
pub const TRANSLATION_TEMPERATURE: f32 = 0.3;

/// Analysis only needs a short, near-deterministic JSON answer.
pub const ANALYSIS_TEMPERATURE: f32 = 0.1;

pub const ANALYSIS_MAX_TOKENS: u32 = 200;

/// Build the two-message translation request for `model`.
pub fn build_translation_prompt(
    content: &str,
    source_language: &str,
    target_language: &str,
    model: &str,
) -> ChatRequest {
    let system = format!(
        "You are a professional technical documentation translator. Your task is to translate \
         Markdown documents from {source_language} to {target_language}.\n\n\
         Rules:\n\
         1. Preserve all Markdown formatting (headers, lists, code blocks, links, etc.)\n\
         2. Do NOT translate code snippets, variable names, function names, or technical identifiers\n\
         3. Do NOT translate URLs, file paths, or command-line examples\n\
         4. Preserve the original document structure exactly\n\
         5. Maintain a professional and accurate translation tone\n\
         6. Keep inline code (`code`) untranslated\n\
         7. Translate comments in code blocks if they are in the source language\n\
         8. Preserve all HTML tags and their attributes\n\
         9. Keep emojis and special characters as-is\n\
         10. Do NOT add any explanations or notes - output ONLY the translated content\n\n\
         Output only the translated Markdown content, nothing else."
    );

    let user = format!(
        "Translate the following Markdown content from {source_language} to {target_language}:\n\n{content}"
    );

    ChatRequest::new(model, vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(TRANSLATION_TEMPERATURE)
}

/// Build the request asking where a language switcher belongs in a README.
pub fn build_readme_analysis_prompt(content: &str, model: &str) -> ChatRequest {
    let system = "You are a Markdown structure analyzer. Analyze the README file and determine \
                  the best position to insert a language switcher section.\n\n\
                  Return ONLY a JSON object with this structure:\n\
                  {\n  \"position\": <line_number>,\n  \"reason\": \"<brief explanation>\"\n}\n\n\
                  Position priority:\n\
                  1. If there's already a translations/language section, return its line number\n\
                  2. After the main title and description, before the first ## heading\n\
                  3. Before the table of contents (TOC)\n\
                  4. At the very beginning (line 0) as fallback\n\n\
                  Count line numbers starting from 0.";

    let user = format!(
        "Analyze this README and suggest where to insert the language switcher:\n\n{content}"
    );

    ChatRequest::new(model, vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(ANALYSIS_TEMPERATURE)
        .with_max_tokens(ANALYSIS_MAX_TOKENS)
}

/// Validated answer to the README analysis prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadmeAnalysis {
    pub position: usize,
    pub reason: String,
}

impl ReadmeAnalysis {
    /// Safe default when the model's answer cannot be used.
    pub fn fallback() -> Self {
        Self {
            position: 0,
            reason: "fallback: unusable analysis response".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    position: serde_json::Value,
    #[serde(default)]
    reason: String,
}

/// Parse and validate an analysis response for a document of `line_count` lines.
///
/// The model may wrap the JSON in prose or a code fence, return a negative or
/// fractional position, or point past the end of the document; all of those
/// are rejected.
pub fn parse_readme_analysis(raw: &str, line_count: usize) -> Result<ReadmeAnalysis, String> {
    let json_str = extract_json_object(raw).ok_or_else(|| "no JSON object found".to_string())?;
    let parsed: RawAnalysis =
        serde_json::from_str(json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let position = parsed
        .position
        .as_u64()
        .ok_or_else(|| format!("position is not a non-negative integer: {}", parsed.position))?;
    let position = usize::try_from(position).map_err(|e| e.to_string())?;

    if position > line_count {
        return Err(format!("position {position} beyond {line_count} lines"));
    }

    Ok(ReadmeAnalysis {
        position,
        reason: parsed.reason,
    })
}

/// Locate a JSON object in LLM output that might contain markdown or extra text.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}
