//! Shared data model
//!
//! Process context, strategy output, the outer response envelope, validation
//! details and uploaded file descriptors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-invocation identity handed to a strategy.
///
/// Built from the authenticated caller, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessContext {
    /// Id of the API key used for the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// User bound to that key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Metadata a strategy attaches to its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    /// Time spent inside the strategy, in milliseconds
    pub processing_time: u64,
    /// Version of the underlying model
    pub model_version: String,
    /// Provider that served the request
    pub api_provider: String,
    /// When the output was produced
    pub timestamp: DateTime<Utc>,
    /// Strategy-specific extras
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutputMetadata {
    /// Create metadata stamped with the current time.
    pub fn new(model_version: impl Into<String>, api_provider: impl Into<String>) -> Self {
        Self {
            processing_time: 0,
            model_version: model_version.into(),
            api_provider: api_provider.into(),
            timestamp: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Set the processing time in milliseconds.
    pub fn with_processing_time(mut self, millis: u64) -> Self {
        self.processing_time = millis;
        self
    }

    /// Attach an extra metadata entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// What a strategy returns: a strategy-specific payload plus optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Strategy-specific result
    pub result: Value,
    /// Output metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OutputMetadata>,
}

impl ModelOutput {
    /// Output without metadata.
    pub fn new(result: Value) -> Self {
        Self {
            result,
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: OutputMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Gateway-level metadata on the outer envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Model that was invoked
    pub model_id: String,
    /// Wall time of the invocation in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    /// When the response was produced
    pub timestamp: DateTime<Utc>,
}

impl EnvelopeMetadata {
    /// Metadata for a completed invocation.
    pub fn new(model_id: impl Into<String>, processing_time: u64) -> Self {
        Self {
            model_id: model_id.into(),
            processing_time: Some(processing_time),
            timestamp: Utc::now(),
        }
    }

    /// Metadata for a request that never reached a strategy.
    pub fn rejected(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            processing_time: None,
            timestamp: Utc::now(),
        }
    }
}

/// Error object carried by a failed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Error name, e.g. `NotFoundError`
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// HTTP status code
    pub status_code: u16,
    /// When the error was produced
    pub timestamp: DateTime<Utc>,
    /// Request path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Request method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Validation violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
    /// Error source chain (non-production only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

/// Uniform response wrapper.
///
/// Only constructible through [`Envelope::ok`] and [`Envelope::failed`], so a
/// successful envelope always carries `data` and never `error`, and a failed one
/// the reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<EnvelopeMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    /// Successful envelope.
    pub fn ok(data: T, metadata: EnvelopeMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            metadata: Some(metadata),
            error: None,
        }
    }

    /// Failed envelope.
    pub fn failed(error: ErrorBody, metadata: Option<EnvelopeMetadata>) -> Self {
        Self {
            success: false,
            data: None,
            metadata,
            error: Some(error),
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Payload of a successful envelope.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Error of a failed envelope.
    pub fn error(&self) -> Option<&ErrorBody> {
        self.error.as_ref()
    }

    /// Gateway metadata.
    pub fn metadata(&self) -> Option<&EnvelopeMetadata> {
        self.metadata.as_ref()
    }
}

/// One schema-rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorDetail {
    /// Dotted path of the offending field (`body` for the root)
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Offending value, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Allowed values for enum violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ValidationErrorDetail {
    /// Detail without value information.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
            allowed_values: None,
        }
    }

    /// Attach the offending value.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach the allowed values.
    pub fn with_allowed_values(mut self, allowed: Vec<Value>) -> Self {
        self.allowed_values = Some(allowed);
        self
    }
}

/// A file received through the multipart gate, buffered in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Form field the file arrived under
    pub fieldname: String,
    /// Client-side file name
    pub originalname: String,
    /// Transfer encoding (`7bit` unless the part says otherwise)
    pub encoding: String,
    /// Resolved MIME type
    pub mimetype: String,
    /// Size in bytes
    pub size: usize,
    /// File contents
    #[serde(skip)]
    pub buffer: Bytes,
    /// On-disk location; always `None` with in-memory buffering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl UploadedFile {
    /// Descriptor placed into the validated body in place of the file contents.
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "originalname": self.originalname,
            "mimetype": self.mimetype,
            "size": self.size,
            "encoding": self.encoding,
        })
    }
}

/// Several uploaded files, grouped the way they arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadedFiles {
    /// All files came from one field
    Sequence(Vec<UploadedFile>),
    /// Files came from several fields
    ByField(BTreeMap<String, Vec<UploadedFile>>),
}

impl UploadedFiles {
    /// Iterate over every file regardless of grouping.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &UploadedFile> + '_> {
        match self {
            Self::Sequence(files) => Box::new(files.iter()),
            Self::ByField(map) => Box::new(map.values().flatten()),
        }
    }

    /// Files uploaded under `field`.
    pub fn field(&self, field: &str) -> Vec<&UploadedFile> {
        match self {
            Self::Sequence(files) => files.iter().filter(|f| f.fieldname == field).collect(),
            Self::ByField(map) => map.get(field).map(|v| v.iter().collect()).unwrap_or_default(),
        }
    }

    /// Total number of files.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether there are no files.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input handed to [`crate::strategy::ModelStrategy::process`]: the validated
/// body merged with the normalized file attachments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationInput {
    /// Validated request body
    pub body: Map<String, Value>,
    /// Single uploaded file
    pub file: Option<UploadedFile>,
    /// Several uploaded files
    pub files: Option<UploadedFiles>,
}

impl InvocationInput {
    /// Input from a JSON body without files.
    pub fn from_body(body: Map<String, Value>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Group uploaded files: one file becomes `file`, several files from one
    /// field become a sequence, files from several fields become a map.
    pub fn with_uploads(mut self, uploads: Vec<UploadedFile>) -> Self {
        match uploads.len() {
            0 => {}
            1 => self.file = uploads.into_iter().next(),
            _ => {
                let first = uploads[0].fieldname.clone();
                if uploads.iter().all(|f| f.fieldname == first) {
                    self.files = Some(UploadedFiles::Sequence(uploads));
                } else {
                    let mut by_field: BTreeMap<String, Vec<UploadedFile>> = BTreeMap::new();
                    for file in uploads {
                        by_field.entry(file.fieldname.clone()).or_default().push(file);
                    }
                    self.files = Some(UploadedFiles::ByField(by_field));
                }
            }
        }
        self
    }

    /// String field of the body.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }

    /// Unsigned integer field of the body.
    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.body.get(name).and_then(Value::as_u64)
    }

    /// Floating point field of the body.
    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.body.get(name).and_then(Value::as_f64)
    }

    /// First uploaded file found under any of `fields`, falling back to the
    /// single `file` attachment.
    pub fn first_file(&self, fields: &[&str]) -> Option<&UploadedFile> {
        if let Some(file) = &self.file
            && fields.contains(&file.fieldname.as_str())
        {
            return Some(file);
        }
        if let Some(files) = &self.files
            && let Some(found) = fields.iter().find_map(|f| files.field(f).into_iter().next())
        {
            return Some(found);
        }
        self.file.as_ref()
    }
}

/// Entry of `GET /models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Model id
    pub model_id: String,
    /// Whether a strategy is registered
    pub available: bool,
    /// When the strategy was registered
    pub registered_at: DateTime<Utc>,
}
