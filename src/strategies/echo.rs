//! Echo strategy: returns its `text` input unchanged.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::plugins::PluginEntry;
use crate::strategy::{ModelStrategy, StrategyError, creator};
use crate::types::{InvocationInput, ModelOutput, OutputMetadata, ProcessContext};

/// Model id of the echo strategy.
pub const MODEL_ID: &str = "echo";

/// Input contract.
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["text"],
        "properties": {
            "text": { "type": "string", "minLength": 1 }
        }
    })
}

/// Registration table row.
pub fn entry() -> PluginEntry {
    PluginEntry::new(MODEL_ID, input_schema(), creator(EchoStrategy::default))
}

/// Echoes `text` back as `echoed`.
#[derive(Debug, Default)]
pub struct EchoStrategy;

#[async_trait]
impl ModelStrategy for EchoStrategy {
    async fn process(
        &mut self,
        input: InvocationInput,
        _context: ProcessContext,
    ) -> Result<ModelOutput, StrategyError> {
        let text = input
            .str_field("text")
            .ok_or_else(|| StrategyError::InvalidInput("'text' must be a string".to_string()))?;
        Ok(ModelOutput::new(json!({ "echoed": text }))
            .with_metadata(OutputMetadata::new("1.0.0", "local")))
    }
}
