//! Built-in model strategies
//!
//! All built-ins are simulated and run locally. Each module exposes its
//! `MODEL_ID`, its `input_schema()` and an `entry()` row for
//! [`crate::plugins::register_all`].

pub mod echo;
pub mod image_generation;
pub mod ocr;
pub mod text_generation;

use crate::plugins::{PluginEntry, StrategyCatalog};
use crate::strategy::creator;

/// Registration table of the built-in strategies.
pub fn builtin_plugins() -> Vec<PluginEntry> {
    vec![
        text_generation::entry(),
        ocr::entry(),
        image_generation::entry(),
        echo::entry(),
    ]
}

/// Catalog of the built-in strategy kinds, keyed by their model ids, for
/// descriptor plugins.
pub fn builtin_catalog() -> StrategyCatalog {
    StrategyCatalog::new()
        .with(
            text_generation::MODEL_ID,
            creator(text_generation::TextGenerationStrategy::default),
        )
        .with(ocr::MODEL_ID, creator(ocr::OcrStrategy::default))
        .with(
            image_generation::MODEL_ID,
            creator(image_generation::ImageGenerationStrategy::default),
        )
        .with(echo::MODEL_ID, creator(echo::EchoStrategy::default))
}
