//! Simulated text generation
//!
//! Deterministic: the completion is derived from the prompt, cut to
//! `maxTokens` words and at the first stop sequence.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::plugins::PluginEntry;
use crate::strategy::{ModelStrategy, StrategyError, creator};
use crate::types::{InvocationInput, ModelOutput, OutputMetadata, ProcessContext};

/// Model id of the text generation strategy.
pub const MODEL_ID: &str = "text-generation";

const MODEL_VERSION: &str = "sim-text-1";
const DEFAULT_MAX_TOKENS: u64 = 256;

/// Input contract.
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["prompt"],
        "properties": {
            "prompt": { "type": "string", "minLength": 1, "maxLength": 32000 },
            "maxTokens": { "type": "integer", "minimum": 1, "maximum": 4096 },
            "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
            "stop": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "maxItems": 4,
                "uniqueItems": true
            }
        },
        "additionalProperties": false
    })
}

/// Registration table row.
pub fn entry() -> PluginEntry {
    PluginEntry::new(
        MODEL_ID,
        input_schema(),
        creator(TextGenerationStrategy::default),
    )
}

/// Token usage of a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Sum of both
    pub total_tokens: u64,
}

/// Simulated text completion.
#[derive(Debug, Default)]
pub struct TextGenerationStrategy;

impl TextGenerationStrategy {
    fn complete(prompt: &str, max_tokens: u64, stop: &[&str]) -> (String, &'static str) {
        let draft = format!("You asked: {prompt}. This is a simulated response.");
        let limit = usize::try_from(max_tokens).unwrap_or(usize::MAX);
        let words: Vec<&str> = draft.split_whitespace().collect();
        let mut finish_reason = "stop";
        let mut text = if words.len() > limit {
            finish_reason = "length";
            words[..limit].join(" ")
        } else {
            words.join(" ")
        };

        if let Some(cut) = stop.iter().filter_map(|s| text.find(s)).min() {
            text.truncate(cut);
            text.truncate(text.trim_end().len());
            finish_reason = "stop";
        }
        (text, finish_reason)
    }
}

#[async_trait]
impl ModelStrategy for TextGenerationStrategy {
    async fn process(
        &mut self,
        input: InvocationInput,
        _context: ProcessContext,
    ) -> Result<ModelOutput, StrategyError> {
        let started = Instant::now();
        let prompt = input
            .str_field("prompt")
            .ok_or_else(|| StrategyError::InvalidInput("'prompt' must be a string".to_string()))?;
        let max_tokens = input.u64_field("maxTokens").unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = input.f64_field("temperature").unwrap_or(1.0);
        let stop: Vec<&str> = input
            .body
            .get("stop")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let (text, finish_reason) = Self::complete(prompt, max_tokens, &stop);
        let prompt_tokens = prompt.split_whitespace().count() as u64;
        let completion_tokens = text.split_whitespace().count() as u64;
        let usage = Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        };

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(ModelOutput::new(json!({ "text": text, "usage": usage }))
            .with_metadata(
                OutputMetadata::new(MODEL_VERSION, "simulated")
                    .with_processing_time(elapsed)
                    .with_extra("finishReason", finish_reason)
                    .with_extra("temperature", temperature),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn input(body: Value) -> InvocationInput {
        let Value::Object(map) = body else {
            return InvocationInput::from_body(Map::new());
        };
        InvocationInput::from_body(map)
    }

    #[tokio::test]
    async fn completes_prompt_with_usage() {
        let output = TextGenerationStrategy
            .process(input(json!({ "prompt": "hello world" })), ProcessContext::default())
            .await
            .unwrap();
        let text = output.result["text"].as_str().unwrap();
        assert!(text.contains("hello world"));
        assert_eq!(output.result["usage"]["promptTokens"], json!(2));
        let metadata = output.metadata.unwrap();
        assert_eq!(metadata.model_version, MODEL_VERSION);
        assert_eq!(metadata.extra["finishReason"], json!("stop"));
    }

    #[tokio::test]
    async fn max_tokens_truncates() {
        let output = TextGenerationStrategy
            .process(
                input(json!({ "prompt": "tell me a story", "maxTokens": 3 })),
                ProcessContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(output.result["text"], json!("You asked: tell"));
        assert_eq!(output.result["usage"]["completionTokens"], json!(3));
        assert_eq!(output.metadata.unwrap().extra["finishReason"], json!("length"));
    }

    #[test]
    fn stop_sequence_cuts_text() {
        let (text, reason) = TextGenerationStrategy::complete("ping", 100, &["simulated"]);
        assert_eq!(text, "You asked: ping. This is a");
        assert_eq!(reason, "stop");
    }
}
