//! Model registries
//!
//! Two physically independent maps keyed by the same model id:
//!
//! - [`factory::StrategyFactory`]: model id → strategy constructor
//! - [`schema::SchemaRegistry`]: model id → input schema and upload policy
//!
//! Both are constructed once per process and passed by reference into the HTTP
//! layer; there is no global instance. [`crate::plugins::register_plugin`] writes
//! both maps together, so plugins never leave a model in only one of them.

/// Strategy factory
pub mod factory;
/// Schema registry
pub mod schema;

pub use factory::StrategyFactory;
pub use schema::{RegisteredSchema, SchemaRegistry};
