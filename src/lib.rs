//! # modelgate
//!
//! A plugin-driven HTTP gateway that exposes one uniform contract for invoking
//! interchangeable model strategies (text generation, OCR, image generation, ...).
//!
//! A model id resolves to three things:
//!
//! - a constructor producing a fresh [`strategy::ModelStrategy`] per invocation
//!   ([`registry::factory::StrategyFactory`]),
//! - a JSON Schema input contract used to validate the request
//!   ([`registry::schema::SchemaRegistry`]),
//! - an upload policy, computed once at registration, that decides whether the
//!   request body is JSON or multipart ([`upload`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GatewayError> {
//!     let config = GatewayConfig::default();
//!     let state = GatewayState::new(&config);
//!     let report = register_all(state.factory(), state.schemas(), builtin_plugins());
//!     tracing::info!(loaded = report.loaded.len(), "built-in plugins registered");
//!     modelgate::server::serve(state, config.bind_addr).await
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Authentication collaborator (API keys)
pub mod auth;
/// Gateway configuration
pub mod config;
/// Invocation controller
pub mod controller;
/// Error types
pub mod error;
/// Dynamic multipart gate
pub mod gate;
/// Plugin registration and discovery
pub mod plugins;
/// Strategy factory and schema registry
pub mod registry;
/// HTTP server, routing and the error boundary
pub mod server;
/// Built-in model strategies
pub mod strategies;
/// Strategy contract
pub mod strategy;
/// Tracing subscriber setup
pub mod telemetry;
/// Shared data model
pub mod types;
/// Upload policies and file-field detection
pub mod upload;
/// Request validation
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

/// Commonly used items
pub mod prelude {
    pub use crate::auth::{ApiKeyRecord, AuthIdentity};
    pub use crate::config::{Environment, GatewayConfig};
    pub use crate::error::{GatewayError, Result};
    pub use crate::plugins::{LoadReport, PluginEntry, register_all, register_plugin};
    pub use crate::registry::factory::StrategyFactory;
    pub use crate::registry::schema::SchemaRegistry;
    pub use crate::server::{GatewayState, build_router};
    pub use crate::strategies::{builtin_catalog, builtin_plugins};
    pub use crate::strategy::{ModelStrategy, StrategyCreator, StrategyError, creator};
    pub use crate::types::{
        Envelope, InvocationInput, ModelOutput, OutputMetadata, ProcessContext,
        ValidationErrorDetail,
    };
    pub use crate::upload::{UploadDeclaration, UploadPolicy};
}
