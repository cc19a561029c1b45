//! Request validation
//!
//! Runs the model's registered schema against the gated body, collecting every
//! violation, and turns each raw validator error into a [`ValidationErrorDetail`]
//! with a dotted field path (`items[0].name`, `body` for the root) and a
//! readable message.
//!
//! A failed validation is answered directly with a 400 envelope listing all
//! violations. It does not pass through the error boundary.

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonschema::ValidationError;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::gate::GatedBody;
use crate::registry::RegisteredSchema;
use crate::server::GatewayState;
use crate::types::{Envelope, EnvelopeMetadata, ErrorBody, InvocationInput, ValidationErrorDetail};

const ROOT_FIELD: &str = "body";

/// Validate `payload` against a compiled schema, returning every violation in
/// validator order. An empty list means the payload is valid.
pub fn validate_payload(
    validator: &jsonschema::Validator,
    payload: &Value,
) -> Vec<ValidationErrorDetail> {
    validator
        .iter_errors(payload)
        .flat_map(|err| describe(&err, payload))
        .collect()
}

/// Validate a gated payload against a registered schema, logging the outcome.
pub fn validate_request(
    registered: &RegisteredSchema,
    payload: &Value,
) -> Result<(), GatewayError> {
    let validator = registered.validator()?;
    let details = validate_payload(validator, payload);
    if details.is_empty() {
        info!(model_id = %registered.model_id(), "validation passed");
        return Ok(());
    }
    warn!(
        model_id = %registered.model_id(),
        violations = details.len(),
        fields = ?details.iter().map(|d| d.field.as_str()).collect::<Vec<_>>(),
        "validation failed"
    );
    Err(GatewayError::ValidationFailed {
        model_id: registered.model_id().to_string(),
        details,
    })
}

/// Validated invocation input, ready for the controller.
#[derive(Debug, Clone)]
pub struct ValidatedInvocation {
    /// Model id from the route
    pub model_id: String,
    /// Validated body merged with uploaded files
    pub input: InvocationInput,
}

impl FromRequest<GatewayState> for ValidatedInvocation {
    type Rejection = Response;

    async fn from_request(req: Request, state: &GatewayState) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_string();
        let method = req.method().to_string();

        let gated = GatedBody::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let registered = state
            .schemas()
            .require(&gated.model_id)
            .map_err(IntoResponse::into_response)?;

        match validate_request(&registered, &gated.payload) {
            Ok(()) => {}
            Err(err @ GatewayError::ValidationFailed { .. }) => {
                return Err(rejection(err, path, method));
            }
            Err(other) => return Err(other.into_response()),
        }

        let Value::Object(body) = gated.payload else {
            return Err(
                GatewayError::BadRequest("Request body must be a JSON object".to_string())
                    .into_response(),
            );
        };
        Ok(Self {
            model_id: gated.model_id,
            input: InvocationInput::from_body(body).with_uploads(gated.uploads),
        })
    }
}

/// The direct 400 response for a failed validation.
fn rejection(err: GatewayError, path: String, method: String) -> Response {
    let status = err.status_code();
    let message = err.to_string();
    let GatewayError::ValidationFailed { model_id, details } = err else {
        return err.into_response();
    };
    let error = ErrorBody {
        name: "ValidationError".to_string(),
        message,
        status_code: status.as_u16(),
        timestamp: Utc::now(),
        path: Some(path),
        method: Some(method),
        details: Some(details),
        stack: None,
    };
    let envelope: Envelope = Envelope::failed(error, Some(EnvelopeMetadata::rejected(model_id)));
    (status, Json(envelope)).into_response()
}

fn describe(err: &ValidationError<'_>, payload: &Value) -> Vec<ValidationErrorDetail> {
    let path = field_path(&err.instance_path.to_string(), payload);
    let value = err.instance.clone().into_owned();

    let detail = match &err.kind {
        ValidationErrorKind::Required { property } => {
            let name = plain(property);
            let field = join(&path, &name);
            return vec![ValidationErrorDetail::new(
                &field,
                format!("Field '{field}' is required"),
            )];
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            return unexpected
                .iter()
                .map(|name| {
                    let field = join(&path, name);
                    let detail = ValidationErrorDetail::new(
                        &field,
                        format!("Field '{field}' is not allowed"),
                    );
                    match value.get(name) {
                        Some(extra) => detail.with_value(extra.clone()),
                        None => detail,
                    }
                })
                .collect();
        }
        ValidationErrorKind::Enum { options } => {
            let field = display(&path);
            let allowed = options.as_array().cloned().unwrap_or_default();
            let listed: Vec<String> = allowed.iter().map(plain).collect();
            ValidationErrorDetail::new(
                field,
                format!("Field '{field}' must be one of: {}", listed.join(", ")),
            )
            .with_allowed_values(allowed)
        }
        kind => {
            let field = display(&path);
            let message = match kind {
                ValidationErrorKind::Type { kind } => {
                    format!("Field '{field}' must be of type {}", type_names(kind))
                }
                ValidationErrorKind::Format { format } => {
                    format!("Field '{field}' must be a valid {format}")
                }
                ValidationErrorKind::Minimum { limit } => format!(
                    "Field '{field}' must be greater than or equal to {}",
                    plain(limit)
                ),
                ValidationErrorKind::Maximum { limit } => format!(
                    "Field '{field}' must be less than or equal to {}",
                    plain(limit)
                ),
                ValidationErrorKind::MinLength { limit } => {
                    format!("Field '{field}' must be at least {limit} characters long")
                }
                ValidationErrorKind::MaxLength { limit } => {
                    format!("Field '{field}' must be at most {limit} characters long")
                }
                ValidationErrorKind::Pattern { pattern } => {
                    format!("Field '{field}' must match pattern '{pattern}'")
                }
                ValidationErrorKind::UniqueItems => {
                    format!("Field '{field}' must contain unique items")
                }
                _ => format!("Field '{field}' is invalid: {err}"),
            };
            ValidationErrorDetail::new(field, message)
        }
    };
    vec![detail.with_value(value)]
}

/// Convert a JSON pointer into a dotted path, using the payload to tell array
/// indexes from object keys.
fn field_path(pointer: &str, payload: &Value) -> String {
    let mut path = String::new();
    let mut current = Some(payload);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match current {
            Some(Value::Array(items)) => {
                path.push('[');
                path.push_str(&segment);
                path.push(']');
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            other => {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(&segment);
                current = other.and_then(|value| value.get(segment.as_str()));
            }
        }
    }
    path
}

fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

fn display(path: &str) -> &str {
    if path.is_empty() { ROOT_FIELD } else { path }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_names(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(ty) => ty.to_string(),
        TypeKind::Multiple(types) => types
            .iter()
            .map(|ty| ty.to_string())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}
