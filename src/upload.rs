//! Upload policies and file-field detection
//!
//! Whether a model accepts multipart uploads is decided once, when its schema is
//! registered, and stored as an [`UploadPolicy`]. The decision comes from, in
//! order:
//!
//! 1. an explicit [`UploadDeclaration`] passed at registration,
//! 2. `x-file-upload` markers on schema properties,
//! 3. the file-token heuristic: a property or required name containing `file`,
//!    `upload`, `image` or `document` (case-insensitive).
//!
//! The heuristic matches substrings, so `profileData` also counts as a file
//! field. Declare [`UploadDeclaration::Disabled`] for such schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default per-file size limit (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of files per request.
pub const DEFAULT_MAX_FILES: usize = 5;

/// Default MIME allow-list.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/tiff",
    "image/bmp",
    "application/pdf",
    "text/plain",
];

/// Schema extension marking a property as a multipart file field.
///
/// ```json
/// { "type": "object", "x-file-upload": { "mimeTypes": ["image/png"], "maxSize": 1048576 } }
/// ```
pub const UPLOAD_EXTENSION: &str = "x-file-upload";

const FILE_TOKENS: &[&str] = &["file", "files", "upload", "image", "document"];
const COMPOSITION_KEYWORDS: &[&str] = &["anyOf", "oneOf", "allOf"];

/// Upload constraints applied by the multipart gate. Fields missing from a
/// deserialized policy take their defaults; unknown keys are rejected. The
/// schema marker spellings `maxSize` and `mimeTypes` are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct UploadPolicy {
    /// Maximum size of a single file in bytes
    #[serde(alias = "maxSize")]
    pub max_file_size: usize,
    /// Maximum number of files per request
    pub max_files: usize,
    /// Accepted MIME types; `type/*` wildcards are allowed
    #[serde(alias = "mimeTypes")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl UploadPolicy {
    /// Set the per-file size limit.
    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the file count limit.
    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    /// Replace the MIME allow-list.
    pub fn with_allowed_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `mime` is on the allow-list. Parameters such as `; charset=utf-8`
    /// are ignored.
    pub fn allows(&self, mime: &str) -> bool {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            match allowed.strip_suffix("/*") {
                Some(top) => essence
                    .split_once('/')
                    .is_some_and(|(essence_top, _)| essence_top == top),
                None => allowed == essence,
            }
        })
    }
}

/// How a registration declares its upload capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadDeclaration {
    /// Derive it from the schema
    #[default]
    Infer,
    /// Accept uploads with this policy
    Enabled(UploadPolicy),
    /// Never parse multipart, whatever the schema says
    Disabled,
}

/// Compute the upload policy for a schema. `defaults` seeds the limits of
/// inferred policies.
pub fn resolve_upload_policy(
    schema: &Value,
    declaration: &UploadDeclaration,
    defaults: &UploadPolicy,
) -> Option<UploadPolicy> {
    match declaration {
        UploadDeclaration::Enabled(policy) => Some(policy.clone()),
        UploadDeclaration::Disabled => None,
        UploadDeclaration::Infer => declared_upload_policy(schema, defaults).or_else(|| {
            requires_file_upload(schema).then(|| defaults.clone())
        }),
    }
}

/// Whether any property or required name in the schema contains a file token.
pub fn requires_file_upload(schema: &Value) -> bool {
    let mut found = false;
    walk_schema(schema, &mut |name, _| {
        if is_file_token(name) {
            found = true;
        }
    });
    found
}

/// Policy assembled from `x-file-upload` markers, if any property carries one.
///
/// Several markers merge: MIME types are unioned and the largest size wins.
pub fn declared_upload_policy(schema: &Value, defaults: &UploadPolicy) -> Option<UploadPolicy> {
    let mut markers = Vec::new();
    walk_schema(schema, &mut |_, property| {
        if let Some(marker) = property.and_then(|p| p.get(UPLOAD_EXTENSION)) {
            markers.push(marker.clone());
        }
    });
    if markers.is_empty() {
        return None;
    }

    let mut mime_types: Vec<String> = Vec::new();
    let mut max_size: Option<usize> = None;
    for marker in &markers {
        if let Some(types) = marker.get("mimeTypes").and_then(Value::as_array) {
            for mime in types.iter().filter_map(Value::as_str) {
                if !mime_types.iter().any(|m| m.eq_ignore_ascii_case(mime)) {
                    mime_types.push(mime.to_string());
                }
            }
        }
        if let Some(size) = marker.get("maxSize").and_then(Value::as_u64) {
            let size = usize::try_from(size).unwrap_or(usize::MAX);
            max_size = Some(max_size.map_or(size, |current| current.max(size)));
        }
    }

    let mut policy = defaults.clone();
    if !mime_types.is_empty() {
        policy.allowed_mime_types = mime_types;
    }
    if let Some(size) = max_size {
        policy.max_file_size = size;
    }
    Some(policy)
}

fn is_file_token(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    FILE_TOKENS.iter().any(|token| lower.contains(token))
}

/// Visit every property name (with its subschema) and every required name
/// (without one), descending through `properties`, `items` and the composition
/// keywords.
fn walk_schema<'a>(schema: &'a Value, visit: &mut dyn FnMut(&'a str, Option<&'a Value>)) {
    let Some(object) = schema.as_object() else {
        return;
    };

    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            visit(name, Some(property));
            walk_schema(property, visit);
        }
    }

    if let Some(required) = object.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            visit(name, None);
        }
    }

    match object.get("items") {
        Some(Value::Array(items)) => {
            for item in items {
                walk_schema(item, visit);
            }
        }
        Some(item) => walk_schema(item, visit),
        None => {}
    }

    for keyword in COMPOSITION_KEYWORDS {
        if let Some(branches) = object.get(*keyword).and_then(Value::as_array) {
            for branch in branches {
                walk_schema(branch, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn policy_accepts_marker_spellings() {
        let policy: UploadPolicy =
            serde_json::from_value(json!({ "mimeTypes": ["application/pdf"], "maxSize": 64 }))
                .unwrap();
        assert_eq!(policy.allowed_mime_types, vec!["application/pdf"]);
        assert_eq!(policy.max_file_size, 64);
        assert_eq!(policy.max_files, DEFAULT_MAX_FILES);

        let typo = serde_json::from_value::<UploadPolicy>(json!({ "mimeType": ["image/png"] }));
        assert!(typo.is_err());
    }

    #[test]
    fn required_image_file_triggers_upload() {
        let schema = json!({
            "type": "object",
            "required": ["imageFile"],
            "properties": { "imageFile": { "type": "object" } }
        });
        assert!(requires_file_upload(&schema));
    }

    #[test]
    fn prompt_only_schema_does_not() {
        let schema = json!({
            "type": "object",
            "properties": { "prompt": { "type": "string" } }
        });
        assert!(!requires_file_upload(&schema));
        assert_eq!(
            resolve_upload_policy(&schema, &UploadDeclaration::Infer, &UploadPolicy::default()),
            None
        );
    }

    #[test]
    fn tokens_found_in_nested_composition() {
        let schema = json!({
            "type": "object",
            "oneOf": [
                { "properties": { "text": { "type": "string" } } },
                { "properties": { "attachments": {
                    "type": "array",
                    "items": { "properties": { "Document": { "type": "object" } } }
                } } }
            ]
        });
        assert!(requires_file_upload(&schema));
    }

    #[test]
    fn heuristic_false_positive_can_be_disabled() {
        let schema = json!({ "properties": { "profileData": { "type": "string" } } });
        assert!(requires_file_upload(&schema));
        assert_eq!(
            resolve_upload_policy(&schema, &UploadDeclaration::Disabled, &UploadPolicy::default()),
            None
        );
    }

    #[test]
    fn extension_marker_overrides_limits() {
        let schema = json!({
            "properties": {
                "scan": {
                    "type": "object",
                    "x-file-upload": { "mimeTypes": ["application/pdf"], "maxSize": 1024 }
                },
                "page": { "type": "object", "x-file-upload": { "mimeTypes": ["image/*"] } }
            }
        });
        let policy =
            resolve_upload_policy(&schema, &UploadDeclaration::Infer, &UploadPolicy::default())
                .unwrap();
        assert_eq!(policy.max_file_size, 1024);
        assert_eq!(policy.max_files, DEFAULT_MAX_FILES);
        assert!(policy.allows("application/pdf"));
        assert!(policy.allows("image/png"));
        assert!(!policy.allows("text/plain"));
    }

    #[test]
    fn allows_ignores_case_and_parameters() {
        let policy = UploadPolicy::default();
        assert!(policy.allows("Text/Plain; charset=utf-8"));
        assert!(!policy.allows("application/x-msdownload"));
    }
}
