//! Dynamic multipart gate
//!
//! [`GatedBody`] materializes the request body before validation runs. The
//! registered [`UploadPolicy`] of the model in the route decides how:
//!
//! - the model accepts uploads and the request is `multipart/form-data`: text
//!   parts become body fields (coerced to the property's declared type) and
//!   file parts are buffered in memory under the policy's limits. Each file is
//!   also described in the body as `{originalname, mimetype, size, encoding}`
//!   so the schema can require it.
//! - otherwise the body is parsed as JSON; an empty body is `{}`.
//!
//! Models without a registered schema have no upload requirements (the gate
//! fails open) and the missing schema is reported by validation.

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Request};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::GatewayError;
use crate::registry::RegisteredSchema;
use crate::server::GatewayState;
use crate::types::UploadedFile;
use crate::upload::UploadPolicy;

const DEFAULT_TRANSFER_ENCODING: &str = "7bit";

/// Request body after the gate: a JSON payload plus any buffered files.
#[derive(Debug, Clone)]
pub struct GatedBody {
    /// Model id from the route
    pub model_id: String,
    /// Parsed body, with file descriptors for multipart uploads
    pub payload: Value,
    /// Buffered files, in arrival order
    pub uploads: Vec<UploadedFile>,
}

impl FromRequest<GatewayState> for GatedBody {
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &GatewayState) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let Path(model_id) = Path::<String>::from_request_parts(&mut parts, state)
            .await
            .map_err(|_| GatewayError::BadRequest("Model id is required".to_string()))?;
        if model_id.trim().is_empty() {
            return Err(GatewayError::BadRequest("Model id is required".to_string()));
        }
        let req = Request::from_parts(parts, body);

        let registered = state.schemas().get(&model_id);
        let policy = registered.as_deref().and_then(RegisteredSchema::upload_policy);

        if is_multipart(&req) {
            match (registered.as_deref(), policy) {
                (Some(schema), Some(policy)) => {
                    debug!(model_id = %model_id, "parsing multipart body");
                    let multipart = Multipart::from_request(req, state)
                        .await
                        .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
                    let (payload, uploads) = read_multipart(schema, policy, multipart).await?;
                    return Ok(Self {
                        model_id,
                        payload,
                        uploads,
                    });
                }
                (Some(_), None) => {
                    return Err(GatewayError::BadRequest(format!(
                        "Model '{model_id}' does not accept file uploads"
                    )));
                }
                (None, _) => {
                    debug!(model_id = %model_id, "no schema registered, skipping multipart body");
                    return Ok(Self {
                        model_id,
                        payload: Value::Object(Map::new()),
                        uploads: Vec::new(),
                    });
                }
            }
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                GatewayError::PayloadTooLarge("Request body is too large".to_string())
            } else {
                GatewayError::BadRequest(rejection.body_text())
            }
        })?;
        Ok(Self {
            model_id,
            payload: parse_json_body(&bytes)?,
            uploads: Vec::new(),
        })
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

fn parse_json_body(bytes: &[u8]) -> Result<Value, GatewayError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::BadRequest(format!("Malformed JSON body: {e}")))
}

fn multipart_error(err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(err.body_text())
    } else {
        GatewayError::BadRequest(err.body_text())
    }
}

async fn read_multipart(
    schema: &RegisteredSchema,
    policy: &UploadPolicy,
    mut multipart: Multipart,
) -> Result<(Value, Vec<UploadedFile>), GatewayError> {
    let mut body = Map::new();
    let mut uploads: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if field.file_name().is_none() {
            let text = field.text().await.map_err(multipart_error)?;
            insert_text_field(&mut body, &name, text, schema.property_type(&name));
            continue;
        }

        if uploads.len() >= policy.max_files {
            return Err(GatewayError::UploadRejected(format!(
                "Too many files: at most {} allowed",
                policy.max_files
            )));
        }
        uploads.push(read_file(name, field, policy).await?);
    }

    for file in &uploads {
        let descriptor = file.descriptor();
        let as_list = schema.property_type(&file.fieldname) == Some("array");
        let merged = match body.remove(&file.fieldname) {
            Some(Value::Array(mut items)) => {
                items.push(descriptor);
                Value::Array(items)
            }
            Some(existing @ Value::Object(_)) => Value::Array(vec![existing, descriptor]),
            _ if as_list => Value::Array(vec![descriptor]),
            _ => descriptor,
        };
        body.insert(file.fieldname.clone(), merged);
    }

    debug!(fields = body.len(), files = uploads.len(), "multipart body parsed");
    Ok((Value::Object(body), uploads))
}

async fn read_file(
    fieldname: String,
    mut field: Field<'_>,
    policy: &UploadPolicy,
) -> Result<UploadedFile, GatewayError> {
    let originalname = field.file_name().unwrap_or_default().to_string();
    let mimetype = resolve_mime(field.content_type(), &originalname);
    if !policy.allows(&mimetype) {
        return Err(GatewayError::UploadRejected(format!(
            "File '{originalname}' has unsupported type '{mimetype}'. Allowed types: {}",
            policy.allowed_mime_types.join(", ")
        )));
    }
    let encoding = field
        .headers()
        .get("content-transfer-encoding")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_TRANSFER_ENCODING)
        .to_string();

    let mut data: Vec<u8> = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > policy.max_file_size {
            return Err(GatewayError::PayloadTooLarge(format!(
                "File '{originalname}' exceeds the maximum size of {} bytes",
                policy.max_file_size
            )));
        }
        data.extend_from_slice(&chunk);
    }

    Ok(UploadedFile {
        fieldname,
        originalname,
        encoding,
        mimetype,
        size: data.len(),
        buffer: Bytes::from(data),
        path: None,
    })
}

/// MIME type of a file part: the part's own content type, else a guess from
/// the file name.
fn resolve_mime(declared: Option<&str>, file_name: &str) -> String {
    match declared.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mime) => mime.to_ascii_lowercase(),
        None => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// Insert a text part, coercing it to the property's declared type. Repeated
/// parts of an array property accumulate.
fn insert_text_field(body: &mut Map<String, Value>, name: &str, text: String, declared: Option<&str>) {
    let value = coerce_text(text, declared);
    if declared == Some("array")
        && let Some(Value::Array(items)) = body.get_mut(name)
    {
        match value {
            Value::Array(more) => items.extend(more),
            single => items.push(single),
        }
        return;
    }
    let value = match (declared, value) {
        (Some("array"), Value::Array(items)) => Value::Array(items),
        (Some("array"), single) => Value::Array(vec![single]),
        (_, value) => value,
    };
    body.insert(name.to_string(), value);
}

/// Multipart text is always a string; convert it when the schema expects
/// something else. Unconvertible text stays a string so validation reports it.
fn coerce_text(text: String, declared: Option<&str>) -> Value {
    let trimmed = text.trim();
    let coerced = match declared {
        Some("integer") => trimmed.parse::<i64>().ok().map(Value::from),
        Some("number") => trimmed.parse::<i64>().ok().map(Value::from).or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }),
        Some("boolean") => match trimmed {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Some("object") => serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_object),
        Some("array") => serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_array),
        Some("null") if trimmed == "null" => Some(Value::Null),
        _ => None,
    };
    coerced.unwrap_or(Value::String(text))
}
