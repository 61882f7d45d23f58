//! Language model access.
//!
//! Every non-deterministic stage goes through the [`LlmClient`] trait so
//! the rest of the system can be tested against canned responses. The only
//! production implementation is [`OllamaClient`].

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::pipeline::Stage;

/// Temperature used by the extraction and resolution stages.
pub const TEMPERATURE_DEFAULT: f32 = 0.7;
/// Temperature for classification, where determinism matters most.
pub const TEMPERATURE_CLASSIFY: f32 = 0.2;
/// Temperature for decomposition.
pub const TEMPERATURE_DECOMPOSE: f32 = 0.3;

/// A JSON-mode completion client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt, returning the raw model text.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

const STRICT_JSON_REMINDER: &str = "\n\nREMINDER: your previous answer was not valid. \
Respond with ONE valid JSON object and nothing else: no prose, no markdown fences, \
no trailing commentary, and every required key present.";

/// Complete a prompt and validate the parsed JSON into `T`.
///
/// A parse or validation failure triggers exactly one retry with a strict
/// JSON reminder appended; a second failure surfaces as a stage-tagged
/// error.
pub async fn complete_validated<L, T, F>(
    llm: &L,
    stage: Stage,
    prompt: &str,
    temperature: f32,
    validate: F,
) -> Result<T>
where
    L: LlmClient + ?Sized,
    F: Fn(Value) -> std::result::Result<T, String>,
{
    let mut last_failure = String::new();
    for attempt in 0..2 {
        let full_prompt = if attempt == 0 {
            prompt.to_string()
        } else {
            warn!(%stage, %last_failure, "retrying with strict JSON reminder");
            format!("{prompt}{STRICT_JSON_REMINDER}")
        };

        let raw = llm.complete(&full_prompt, temperature).await?;
        let cleaned = strip_code_fences(&raw);
        debug!(%stage, attempt, response = cleaned, "model response");

        match serde_json::from_str::<Value>(cleaned) {
            Ok(value) => match validate(value) {
                Ok(parsed) => return Ok(parsed),
                Err(reason) => last_failure = reason,
            },
            Err(e) => last_failure = format!("invalid JSON: {e}"),
        }
    }

    Err(CoreError::ParseLlm {
        stage,
        detail: last_failure,
    })
}

/// Strip a single leading/trailing markdown code fence, which smaller
/// models emit even when told not to.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockLlm;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn retries_once_on_bad_json() {
        let llm = MockLlm::new();
        llm.push("this is not json");
        llm.push(r#"{"ok": true}"#);

        let value = complete_validated(&llm, Stage::Extract, "prompt", 0.7, |v| {
            v.get("ok")
                .and_then(Value::as_bool)
                .ok_or_else(|| "missing ok".to_string())
        })
        .await
        .unwrap();
        assert!(value);
    }

    #[tokio::test]
    async fn second_failure_is_stage_tagged() {
        let llm = MockLlm::new();
        llm.push("nope");
        llm.push("still nope");

        let err = complete_validated(&llm, Stage::Resolve, "prompt", 0.7, |_| {
            Err::<(), _>("unreachable".to_string())
        })
        .await
        .unwrap_err();
        match err {
            CoreError::ParseLlm { stage, .. } => assert_eq!(stage, Stage::Resolve),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
