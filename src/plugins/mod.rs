//! Plugin registration and discovery
//!
//! Plugins reach the registries in one of two ways:
//!
//! - a static registration table of [`PluginEntry`] values handed to
//!   [`register_all`] (how built-in strategies are wired), or
//! - [`PluginSource`] candidates loaded concurrently by [`load_plugins`]. Each
//!   candidate yields untyped [`PluginExports`] that are validated before
//!   registration. [`discovery`] provides the directory-based source.
//!
//! Failures are isolated per plugin: they are logged, collected into the
//! [`LoadReport`] and never abort sibling plugins.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::registry::{SchemaRegistry, StrategyFactory};
use crate::strategy::StrategyCreator;
use crate::upload::UploadDeclaration;

/// Strategy catalog used to resolve descriptor plugins
pub mod catalog;
/// Directory-based plugin discovery
pub mod discovery;

pub use catalog::StrategyCatalog;
pub use discovery::{DescriptorPlugin, ENTRY_FILE, discover, load_from_dir};

/// One row of the registration table.
pub struct PluginEntry {
    /// Model id
    pub model_id: String,
    /// Input schema
    pub schema: Value,
    /// Strategy constructor
    pub creator: StrategyCreator,
    /// Upload capability
    pub upload: UploadDeclaration,
}

impl PluginEntry {
    /// Entry whose upload capability is inferred from the schema.
    pub fn new(model_id: impl Into<String>, schema: Value, creator: StrategyCreator) -> Self {
        Self {
            model_id: model_id.into(),
            schema,
            creator,
            upload: UploadDeclaration::Infer,
        }
    }

    /// Declare the upload capability explicitly.
    pub fn with_upload(mut self, upload: UploadDeclaration) -> Self {
        self.upload = upload;
        self
    }
}

/// Raw exports of a plugin candidate, validated by [`PluginExports::validate`].
#[derive(Default)]
pub struct PluginExports {
    /// Expected: non-empty string
    pub model_id: Option<Value>,
    /// Expected: JSON object
    pub config_schema: Option<Value>,
    /// Expected: strategy constructor
    pub strategy: Option<StrategyCreator>,
    /// Upload capability
    pub upload: UploadDeclaration,
}

impl PluginExports {
    /// Check the export shape, naming every missing or mistyped export.
    pub fn validate(self, plugin: &str) -> Result<PluginEntry> {
        let mut problems = Vec::new();

        let model_id = match self.model_id {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            Some(_) => {
                problems.push("modelId (expected a non-empty string)");
                None
            }
            None => {
                problems.push("modelId (missing)");
                None
            }
        };
        let schema = match self.config_schema {
            Some(schema @ Value::Object(_)) => Some(schema),
            Some(_) => {
                problems.push("configSchema (expected an object)");
                None
            }
            None => {
                problems.push("configSchema (missing)");
                None
            }
        };
        if self.strategy.is_none() {
            problems.push("strategy (missing or unknown constructor)");
        }

        match (model_id, schema, self.strategy) {
            (Some(model_id), Some(schema), Some(creator)) => Ok(PluginEntry {
                model_id,
                schema,
                creator,
                upload: self.upload,
            }),
            _ => Err(GatewayError::InvalidPlugin {
                plugin: plugin.to_string(),
                reason: format!("invalid exports: {}", problems.join(", ")),
            }),
        }
    }
}

/// A plugin candidate that can be loaded independently of its siblings.
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Candidate name, e.g. its directory name.
    fn name(&self) -> &str;

    /// Load the candidate's exports.
    async fn load(&self) -> Result<PluginExports>;
}

/// A plugin that failed to load or register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFailure {
    /// Candidate name
    pub plugin: String,
    /// Error message
    pub error: String,
}

/// Outcome of a registration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Model ids registered in this run
    pub loaded: Vec<String>,
    /// Candidates that failed
    pub failures: Vec<PluginFailure>,
    /// Strategies in the factory after the run
    pub strategies: usize,
    /// Schemas in the registry after the run
    pub schemas: usize,
}

impl LoadReport {
    fn record(&mut self, plugin: &str, outcome: Result<String>) {
        match outcome {
            Ok(model_id) => {
                info!(plugin = %plugin, model_id = %model_id, "plugin loaded");
                self.loaded.push(model_id);
            }
            Err(err) => {
                warn!(plugin = %plugin, error = %err, "plugin failed to load");
                self.failures.push(PluginFailure {
                    plugin: plugin.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    fn finish(mut self, factory: &StrategyFactory, schemas: &SchemaRegistry) -> Self {
        self.strategies = factory.len();
        self.schemas = schemas.size();
        info!(
            loaded = self.loaded.len(),
            failed = self.failures.len(),
            strategies = self.strategies,
            schemas = self.schemas,
            "plugin registration finished"
        );
        self
    }
}

/// Register a strategy and its schema together.
///
/// Duplicates are detected in both maps before either is written, so a failed
/// registration leaves existing entries untouched and never half-registers.
pub fn register_plugin(
    factory: &StrategyFactory,
    schemas: &SchemaRegistry,
    entry: PluginEntry,
) -> Result<()> {
    let PluginEntry {
        model_id,
        schema,
        creator,
        upload,
    } = entry;

    if factory.is_registered(&model_id) || schemas.has_schema(&model_id) {
        return Err(GatewayError::DuplicateRegistration(model_id));
    }
    schemas.register_with_upload(model_id.clone(), schema, upload)?;
    if let Err(err) = factory.register(model_id.clone(), creator) {
        schemas.unregister(&model_id);
        return Err(err);
    }
    Ok(())
}

/// Register a static table of plugins.
pub fn register_all(
    factory: &StrategyFactory,
    schemas: &SchemaRegistry,
    entries: impl IntoIterator<Item = PluginEntry>,
) -> LoadReport {
    let mut report = LoadReport::default();
    for entry in entries {
        let name = entry.model_id.clone();
        let model_id = name.clone();
        let outcome = register_plugin(factory, schemas, entry).map(|()| model_id);
        report.record(&name, outcome);
    }
    report.finish(factory, schemas)
}

/// Load candidates concurrently, then register the valid ones in candidate
/// order. The first registrant of a model id wins.
pub async fn load_plugins(
    factory: &StrategyFactory,
    schemas: &SchemaRegistry,
    sources: &[Box<dyn PluginSource>],
) -> LoadReport {
    let settled = join_all(sources.iter().map(|source| async move {
        let name = source.name();
        let entry = source
            .load()
            .await
            .and_then(|exports| exports.validate(name));
        (name, entry)
    }))
    .await;

    let mut report = LoadReport::default();
    for (name, entry) in settled {
        let outcome = entry.and_then(|entry| {
            let model_id = entry.model_id.clone();
            register_plugin(factory, schemas, entry).map(|()| model_id)
        });
        report.record(name, outcome);
    }
    report.finish(factory, schemas)
}
