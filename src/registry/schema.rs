//! Schema registry
//!
//! Authoritative source of per-model input contracts. Registration only checks
//! that the schema is a JSON object; the schema is compiled lazily, on first
//! validation, and the compiled validator is cached for the process lifetime.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::upload::{UploadDeclaration, UploadPolicy, resolve_upload_policy};

/// A registered input contract.
pub struct RegisteredSchema {
    model_id: String,
    schema: Value,
    upload: Option<UploadPolicy>,
    registered_at: DateTime<Utc>,
    compiled: OnceLock<std::result::Result<jsonschema::Validator, String>>,
}

impl RegisteredSchema {
    /// Model id the schema is registered under.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Raw schema document.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Upload policy computed at registration; `None` means JSON only.
    pub fn upload_policy(&self) -> Option<&UploadPolicy> {
        self.upload.as_ref()
    }

    /// Registration time.
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Compiled validator, built on first use.
    ///
    /// A schema that does not compile fails every request with
    /// [`GatewayError::InvalidSchema`].
    pub fn validator(&self) -> Result<&jsonschema::Validator> {
        self.compiled
            .get_or_init(|| jsonschema::validator_for(&self.schema).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|reason| GatewayError::InvalidSchema {
                model_id: self.model_id.clone(),
                reason: reason.clone(),
            })
    }

    /// Declared `type` of a top-level property, if the schema names one.
    pub fn property_type(&self, property: &str) -> Option<&str> {
        self.schema
            .get("properties")?
            .get(property)?
            .get("type")?
            .as_str()
    }
}

impl fmt::Debug for RegisteredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSchema")
            .field("model_id", &self.model_id)
            .field("upload", &self.upload)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// In-memory map from model id to input schema.
pub struct SchemaRegistry {
    entries: RwLock<HashMap<String, Arc<RegisteredSchema>>>,
    upload_defaults: UploadPolicy,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Empty registry using the default upload limits.
    pub fn new() -> Self {
        Self::with_upload_defaults(UploadPolicy::default())
    }

    /// Empty registry whose inferred upload policies start from `defaults`.
    pub fn with_upload_defaults(defaults: UploadPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            upload_defaults: defaults,
        }
    }

    /// Register a schema, inferring its upload policy.
    pub fn register(&self, model_id: impl Into<String>, schema: Value) -> Result<()> {
        self.register_with_upload(model_id, schema, UploadDeclaration::Infer)
    }

    /// Register a schema with an explicit upload declaration.
    pub fn register_with_upload(
        &self,
        model_id: impl Into<String>,
        schema: Value,
        upload: UploadDeclaration,
    ) -> Result<()> {
        let model_id = model_id.into();
        if model_id.trim().is_empty() {
            return Err(GatewayError::BadRequest(
                "Model id must not be empty".to_string(),
            ));
        }
        if !schema.is_object() {
            return Err(GatewayError::InvalidSchema {
                model_id,
                reason: "schema must be a JSON object".to_string(),
            });
        }

        let mut entries = self.write();
        if entries.contains_key(&model_id) {
            return Err(GatewayError::DuplicateRegistration(model_id));
        }

        let policy = resolve_upload_policy(&schema, &upload, &self.upload_defaults);
        tracing::debug!(
            model_id = %model_id,
            file_upload = policy.is_some(),
            "schema registered"
        );
        entries.insert(
            model_id.clone(),
            Arc::new(RegisteredSchema {
                model_id,
                schema,
                upload: policy,
                registered_at: Utc::now(),
                compiled: OnceLock::new(),
            }),
        );
        Ok(())
    }

    /// Registered entry for `model_id`.
    pub fn get(&self, model_id: &str) -> Option<Arc<RegisteredSchema>> {
        self.read().get(model_id).cloned()
    }

    /// Registered entry for `model_id`, or `NotFound`.
    pub fn require(&self, model_id: &str) -> Result<Arc<RegisteredSchema>> {
        self.get(model_id).ok_or_else(|| {
            GatewayError::NotFound(format!(
                "No input schema registered for model '{model_id}'"
            ))
        })
    }

    /// Schema document for `model_id`.
    pub fn get_schema(&self, model_id: &str) -> Result<Value> {
        self.require(model_id).map(|entry| entry.schema.clone())
    }

    /// Upload policy of `model_id`; unknown models have none.
    pub fn upload_policy(&self, model_id: &str) -> Option<UploadPolicy> {
        self.get(model_id).and_then(|entry| entry.upload.clone())
    }

    /// Whether a schema is registered for `model_id`.
    pub fn has_schema(&self, model_id: &str) -> bool {
        self.read().contains_key(model_id)
    }

    /// Registered model ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a schema. Returns whether one was present.
    pub fn unregister(&self, model_id: &str) -> bool {
        self.write().remove(model_id).is_some()
    }

    /// Remove every schema.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of registered schemas.
    pub fn size(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<RegisteredSchema>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<RegisteredSchema>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> Value {
        json!({
            "type": "object",
            "required": ["text"],
            "properties": { "text": { "type": "string", "minLength": 1 } }
        })
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let registry = SchemaRegistry::new();
        registry.register("echo", echo_schema()).unwrap();

        let err = registry
            .register("echo", json!({ "type": "object" }))
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateRegistration(ref id) if id == "echo"));
        assert_eq!(registry.get_schema("echo").unwrap(), echo_schema());
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn rejects_non_object_schemas() {
        let registry = SchemaRegistry::new();
        for schema in [Value::Null, json!(true), json!([1, 2]), json!("object")] {
            let err = registry.register("bad", schema).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidSchema { .. }));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_schema_is_not_found() {
        let registry = SchemaRegistry::new();
        let err = registry.get_schema("ghost").unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(ref msg) if msg.contains("ghost")));
    }

    #[test]
    fn bookkeeping() {
        let registry = SchemaRegistry::new();
        registry.register("b", echo_schema()).unwrap();
        registry.register("a", echo_schema()).unwrap();
        assert_eq!(registry.list(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.has_schema("a"));
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        registry.clear();
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn upload_policy_computed_at_registration() {
        let registry = SchemaRegistry::new();
        registry
            .register(
                "ocr",
                json!({ "required": ["imageFile"], "properties": { "imageFile": {} } }),
            )
            .unwrap();
        registry.register("echo", echo_schema()).unwrap();
        assert!(registry.upload_policy("ocr").is_some());
        assert!(registry.upload_policy("echo").is_none());
        assert!(registry.upload_policy("ghost").is_none());
    }

    #[test]
    fn malformed_schema_fails_at_compile_time_not_registration() {
        let registry = SchemaRegistry::new();
        registry
            .register("broken", json!({ "type": "no-such-type" }))
            .unwrap();
        let entry = registry.get("broken").unwrap();
        assert!(matches!(
            entry.validator(),
            Err(GatewayError::InvalidSchema { .. })
        ));
    }
}
