//! Simulated image generation
//!
//! Produces `n` placeholder image references. A request `seed` makes the
//! per-image seeds reproducible.

use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::plugins::PluginEntry;
use crate::strategy::{ModelStrategy, StrategyError, creator};
use crate::types::{InvocationInput, ModelOutput, OutputMetadata, ProcessContext};

/// Model id of the image generation strategy.
pub const MODEL_ID: &str = "image-generation";

const MODEL_VERSION: &str = "sim-image-1";
const SIZES: &[&str] = &["256x256", "512x512", "1024x1024"];
const DEFAULT_SIZE: &str = "512x512";

/// Input contract.
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["prompt"],
        "properties": {
            "prompt": { "type": "string", "minLength": 1, "maxLength": 4000 },
            "size": { "type": "string", "enum": SIZES },
            "n": { "type": "integer", "minimum": 1, "maximum": 4 },
            "seed": { "type": "integer", "minimum": 0 }
        },
        "additionalProperties": false
    })
}

/// Registration table row.
pub fn entry() -> PluginEntry {
    PluginEntry::new(
        MODEL_ID,
        input_schema(),
        creator(ImageGenerationStrategy::default),
    )
}

/// One generated image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    /// Where the image can be fetched
    pub url: String,
    /// Image dimensions
    pub size: String,
    /// Seed the image was generated from
    pub seed: u64,
}

/// Simulated image generation.
#[derive(Debug, Default)]
pub struct ImageGenerationStrategy;

#[async_trait]
impl ModelStrategy for ImageGenerationStrategy {
    async fn process(
        &mut self,
        input: InvocationInput,
        _context: ProcessContext,
    ) -> Result<ModelOutput, StrategyError> {
        let started = Instant::now();
        let prompt = input
            .str_field("prompt")
            .ok_or_else(|| StrategyError::InvalidInput("'prompt' must be a string".to_string()))?;
        let size = input.str_field("size").unwrap_or(DEFAULT_SIZE);
        if !SIZES.contains(&size) {
            return Err(StrategyError::InvalidInput(format!(
                "Unsupported size '{size}'"
            )));
        }
        let count = input.u64_field("n").unwrap_or(1).clamp(1, 4);
        let seed = input
            .u64_field("seed")
            .unwrap_or_else(|| u64::from(rand::random::<u32>()));

        let mut rng = StdRng::seed_from_u64(seed);
        let images: Vec<GeneratedImage> = (0..count)
            .map(|_| GeneratedImage {
                url: format!("memory://images/{}.png", Uuid::new_v4()),
                size: size.to_string(),
                seed: u64::from(rng.r#gen::<u32>()),
            })
            .collect();

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(ModelOutput::new(json!({
            "images": images,
            "prompt": prompt,
        }))
        .with_metadata(
            OutputMetadata::new(MODEL_VERSION, "simulated")
                .with_processing_time(elapsed)
                .with_extra("seed", seed),
        ))
    }
}
