//! Strategy contract
//!
//! Every pluggable model implements [`ModelStrategy`]. The factory stores a
//! [`StrategyCreator`] per model id and builds a fresh instance for every
//! invocation, so strategies may keep per-invocation state in `&mut self`
//! without leaking it across requests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{InvocationInput, ModelOutput, ProcessContext};

/// Errors a strategy can return from [`ModelStrategy::process`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    /// The input passed schema validation but the strategy cannot use it
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backing provider failed
    #[error("{provider} provider error: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Provider message
        message: String,
    },

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Processing contract shared by all model strategies.
#[async_trait]
pub trait ModelStrategy: Send {
    /// Process one invocation.
    async fn process(
        &mut self,
        input: InvocationInput,
        context: ProcessContext,
    ) -> Result<ModelOutput, StrategyError>;
}

/// Zero-argument constructor producing a fresh strategy per call.
pub type StrategyCreator = Arc<dyn Fn() -> Box<dyn ModelStrategy> + Send + Sync>;

/// Wrap a constructor function into a [`StrategyCreator`].
///
/// ```rust,ignore
/// let creator = modelgate::strategy::creator(EchoStrategy::default);
/// ```
pub fn creator<S, F>(construct: F) -> StrategyCreator
where
    S: ModelStrategy + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Arc::new(move || Box::new(construct()) as Box<dyn ModelStrategy>)
}
