//! Directory-based plugin discovery
//!
//! Layout of a plugins root:
//!
//! ```text
//! plugins/
//!   summarizer/
//!     index.json   { "modelId": "summarizer", "configSchema": {..}, "strategy": "text-generation" }
//!   scanner/
//!     index.json   { "modelId": "scanner", "configSchema": {..}, "strategy": "ocr",
//!                    "fileUpload": { "mimeTypes": ["application/pdf"] } }
//! ```
//!
//! Each immediate subdirectory is one candidate named after the directory.
//! `strategy` (or `StrategyClass`) names a kind in the [`StrategyCatalog`].
//! `fileUpload` is optional: `false` disables uploads, `true` or a policy
//! object enables them, absent or `null` leaves the decision to the schema.
//! A policy object takes `allowedMimeTypes` (or `mimeTypes`), `maxFileSize`
//! (or `maxSize`) and `maxFiles`; any other key fails the plugin.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{LoadReport, PluginExports, PluginSource, StrategyCatalog, load_plugins};
use crate::error::{GatewayError, Result};
use crate::registry::{SchemaRegistry, StrategyFactory};
use crate::upload::{UploadDeclaration, UploadPolicy};

/// Entry descriptor looked up in every plugin directory.
pub const ENTRY_FILE: &str = "index.json";

const STRATEGY_KEYS: &[&str] = &["strategy", "StrategyClass"];

/// A plugin described by `<dir>/index.json`.
#[derive(Debug, Clone)]
pub struct DescriptorPlugin {
    name: String,
    dir: PathBuf,
    catalog: Arc<StrategyCatalog>,
}

impl DescriptorPlugin {
    /// Candidate for `dir`, named after its last path component.
    pub fn new(dir: impl Into<PathBuf>, catalog: Arc<StrategyCatalog>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self { name, dir, catalog }
    }

    /// Path of the entry descriptor.
    pub fn entry_path(&self) -> PathBuf {
        self.dir.join(ENTRY_FILE)
    }

    fn invalid(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::InvalidPlugin {
            plugin: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn upload_declaration(&self, value: Option<&Value>) -> Result<UploadDeclaration> {
        match value {
            None | Some(Value::Null) => Ok(UploadDeclaration::Infer),
            Some(Value::Bool(false)) => Ok(UploadDeclaration::Disabled),
            Some(Value::Bool(true)) => Ok(UploadDeclaration::Enabled(UploadPolicy::default())),
            Some(policy @ Value::Object(_)) => serde_json::from_value(policy.clone())
                .map(UploadDeclaration::Enabled)
                .map_err(|e| self.invalid(format!("invalid fileUpload policy: {e}"))),
            Some(_) => Err(self.invalid("fileUpload must be a boolean or an object")),
        }
    }
}

#[async_trait]
impl PluginSource for DescriptorPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PluginExports> {
        let path = self.entry_path();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| self.invalid(format!("cannot read {}: {e}", path.display())))?;
        let descriptor: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|e| self.invalid(format!("{ENTRY_FILE} is not a JSON object: {e}")))?;

        let kind = STRATEGY_KEYS.iter().find_map(|key| descriptor.get(*key));
        let strategy = match kind {
            Some(Value::String(kind)) => {
                let creator = self.catalog.get(kind);
                if creator.is_none() {
                    warn!(
                        plugin = %self.name,
                        strategy = %kind,
                        known = ?self.catalog.kinds(),
                        "unknown strategy kind"
                    );
                }
                creator
            }
            _ => None,
        };

        Ok(PluginExports {
            model_id: descriptor.get("modelId").cloned(),
            config_schema: descriptor.get("configSchema").cloned(),
            strategy,
            upload: self.upload_declaration(descriptor.get("fileUpload"))?,
        })
    }
}

/// Enumerate the plugin candidates under `root`, sorted by directory name.
///
/// A missing root is not an error: it is logged and yields no candidates.
pub async fn discover(
    root: &Path,
    catalog: Arc<StrategyCatalog>,
) -> Result<Vec<Box<dyn PluginSource>>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(root = %root.display(), "plugins directory not found, no plugins to load");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(GatewayError::Configuration(format!(
                "cannot read plugins directory {}: {e}",
                root.display()
            )));
        }
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        GatewayError::Configuration(format!(
            "cannot read plugins directory {}: {e}",
            root.display()
        ))
    })? {
        match entry.file_type().await {
            Ok(kind) if kind.is_dir() => dirs.push(entry.path()),
            Ok(_) => debug!(path = %entry.path().display(), "skipping non-directory entry"),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot stat plugin entry"),
        }
    }
    dirs.sort();

    info!(root = %root.display(), candidates = dirs.len(), "discovered plugin candidates");
    Ok(dirs
        .into_iter()
        .map(|dir| Box::new(DescriptorPlugin::new(dir, catalog.clone())) as Box<dyn PluginSource>)
        .collect())
}

/// Discover and register every plugin under `root`.
pub async fn load_from_dir(
    factory: &StrategyFactory,
    schemas: &SchemaRegistry,
    root: &Path,
    catalog: Arc<StrategyCatalog>,
) -> Result<LoadReport> {
    let sources = discover(root, catalog).await?;
    Ok(load_plugins(factory, schemas, &sources).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::builtin_catalog;
    use serde_json::json;
    use tracing_test::traced_test;

    fn write_plugin(root: &Path, name: &str, descriptor: &Value) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ENTRY_FILE), descriptor.to_string()).unwrap();
    }

    #[tokio::test]
    async fn descriptor_resolves_strategy_and_upload() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "scanner",
            &json!({
                "modelId": "scanner",
                "configSchema": { "type": "object" },
                "StrategyClass": "ocr",
                "fileUpload": { "allowedMimeTypes": ["application/pdf"] }
            }),
        );

        let plugin = DescriptorPlugin::new(root.path().join("scanner"), Arc::new(builtin_catalog()));
        assert_eq!(plugin.name(), "scanner");
        let exports = plugin.load().await.unwrap();
        assert!(exports.strategy.is_some());
        let UploadDeclaration::Enabled(policy) = exports.upload else {
            panic!("uploads should be enabled");
        };
        assert_eq!(policy.allowed_mime_types, vec!["application/pdf"]);
        assert_eq!(policy.max_files, crate::upload::DEFAULT_MAX_FILES);
    }

    #[tokio::test]
    async fn descriptor_upload_accepts_marker_keys() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "scanner",
            &json!({
                "modelId": "scanner",
                "configSchema": { "type": "object" },
                "strategy": "ocr",
                "fileUpload": { "mimeTypes": ["application/pdf"], "maxSize": 1024 }
            }),
        );
        write_plugin(
            root.path(),
            "typo",
            &json!({
                "modelId": "typo",
                "configSchema": { "type": "object" },
                "strategy": "ocr",
                "fileUpload": { "mimeType": ["application/pdf"] }
            }),
        );

        let plugin = DescriptorPlugin::new(root.path().join("scanner"), Arc::new(builtin_catalog()));
        let UploadDeclaration::Enabled(policy) = plugin.load().await.unwrap().upload else {
            panic!("uploads should be enabled");
        };
        assert_eq!(policy.allowed_mime_types, vec!["application/pdf"]);
        assert_eq!(policy.max_file_size, 1024);
        assert!(policy.allows("application/pdf"));
        assert!(!policy.allows("image/png"));

        let plugin = DescriptorPlugin::new(root.path().join("typo"), Arc::new(builtin_catalog()));
        let err = plugin.load().await.err().unwrap();
        assert!(matches!(err, GatewayError::InvalidPlugin { ref plugin, .. } if plugin == "typo"));
        assert!(err.to_string().contains("invalid fileUpload policy"), "{err}");
    }

    #[tokio::test]
    async fn upload_false_disables_uploads() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "profile",
            &json!({
                "modelId": "profile",
                "configSchema": { "properties": { "profileData": { "type": "string" } } },
                "strategy": "echo",
                "fileUpload": false
            }),
        );
        let plugin = DescriptorPlugin::new(root.path().join("profile"), Arc::new(builtin_catalog()));
        let exports = plugin.load().await.unwrap();
        assert_eq!(exports.upload, UploadDeclaration::Disabled);
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_kind_is_reported_as_missing_strategy() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "mystery",
            &json!({ "modelId": "mystery", "configSchema": {}, "strategy": "telepathy" }),
        );
        let plugin = DescriptorPlugin::new(root.path().join("mystery"), Arc::new(builtin_catalog()));
        let err = plugin.load().await.unwrap().validate("mystery").err().unwrap();
        assert!(err.to_string().contains("strategy (missing or unknown constructor)"));
        assert!(logs_contain("unknown strategy kind"));
    }

    #[tokio::test]
    async fn missing_entry_file_fails_the_candidate() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("empty")).unwrap();
        let plugin = DescriptorPlugin::new(root.path().join("empty"), Arc::new(builtin_catalog()));
        let err = plugin.load().await.err().unwrap();
        assert!(matches!(err, GatewayError::InvalidPlugin { ref plugin, .. } if plugin == "empty"));
    }

    #[tokio::test]
    async fn discover_skips_files_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("b")).unwrap();
        std::fs::create_dir(root.path().join("a")).unwrap();
        std::fs::write(root.path().join("README.txt"), "not a plugin").unwrap();

        let sources = discover(root.path(), Arc::new(builtin_catalog())).await.unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_root_yields_no_candidates() {
        let root = tempfile::tempdir().unwrap();
        let sources = discover(&root.path().join("nope"), Arc::new(builtin_catalog()))
            .await
            .unwrap();
        assert!(sources.is_empty());
        assert!(logs_contain("plugins directory not found"));
    }
}
