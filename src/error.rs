//! Error types for modelgate
//!
//! Every failure in the gateway is a [`GatewayError`]. Each variant knows its
//! HTTP status and the public error name used in response envelopes. Rendering
//! into the final JSON envelope happens once, in the error boundary middleware
//! (see [`crate::server::boundary`]), which has access to the request path and
//! method.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::strategy::StrategyError;
use crate::types::ValidationErrorDetail;

/// Errors produced by the gateway core.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A required request parameter is missing or malformed
    #[error("{0}")]
    BadRequest(String),

    /// No usable credentials were presented
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials lack the required permission
    #[error("{0}")]
    Forbidden(String),

    /// A resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// The model id has no registered strategy
    #[error("Model '{0}' is not available")]
    ModelNotAvailable(String),

    /// The request body violates the model's input schema
    #[error("Validation failed for model '{model_id}' with {} violation(s)", .details.len())]
    ValidationFailed {
        /// Model the body was validated against
        model_id: String,
        /// Every violation, in validator order
        details: Vec<ValidationErrorDetail>,
    },

    /// The model id is already present in the factory or registry
    #[error("Model '{0}' is already registered")]
    DuplicateRegistration(String),

    /// The schema handed to the registry is unusable
    #[error("Invalid schema for model '{model_id}': {reason}")]
    InvalidSchema {
        /// Model the schema belongs to
        model_id: String,
        /// What is wrong with it
        reason: String,
    },

    /// A plugin candidate failed to load or exported the wrong shape
    #[error("Plugin '{plugin}' failed to load: {reason}")]
    InvalidPlugin {
        /// Plugin (directory) name
        plugin: String,
        /// Why loading failed
        reason: String,
    },

    /// A file part was rejected by the upload policy
    #[error("{0}")]
    UploadRejected(String),

    /// A request body or file exceeded its size limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The strategy did not finish within the configured timeout
    #[error("Model '{model_id}' did not respond within {timeout_ms}ms")]
    Timeout {
        /// Model that timed out
        model_id: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// The strategy failed while processing
    #[error("{source}")]
    Strategy {
        /// Model whose strategy failed
        model_id: String,
        /// Error returned by the strategy
        #[source]
        source: StrategyError,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tracing subscriber setup failed
    #[error("Telemetry initialization error: {0}")]
    Telemetry(String),

    /// Anything unclassified
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UploadRejected(_) | Self::ValidationFailed { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::ModelNotAvailable(_) => StatusCode::NOT_FOUND,
            Self::DuplicateRegistration(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Strategy { source, .. } => match source {
                StrategyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidSchema { .. }
            | Self::InvalidPlugin { .. }
            | Self::Configuration(_)
            | Self::Telemetry(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Public error name used in the `error.name` envelope field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequestError",
            Self::Unauthorized(_) => "UnauthorizedError",
            Self::Forbidden(_) => "ForbiddenError",
            Self::NotFound(_) | Self::ModelNotAvailable(_) => "NotFoundError",
            Self::ValidationFailed { .. } => "ValidationError",
            Self::DuplicateRegistration(_) => "DuplicateRegistrationError",
            Self::InvalidSchema { .. } => "InvalidSchemaError",
            Self::InvalidPlugin { .. } => "PluginLoadError",
            Self::UploadRejected(_) => "UploadError",
            Self::PayloadTooLarge(_) => "PayloadTooLargeError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Strategy { source, .. } => match source {
                StrategyError::InvalidInput(_) => "BadRequestError",
                _ => "InternalServerError",
            },
            Self::Configuration(_) | Self::Telemetry(_) | Self::Internal(_) => {
                "InternalServerError"
            }
        }
    }

    /// Messages of this error and every error in its source chain.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

/// Error details handed from [`GatewayError::into_response`] to the error
/// boundary through response extensions.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Public error name
    pub name: &'static str,
    /// Human-readable message
    pub message: String,
    /// Source chain, rendered only outside production
    pub chain: Vec<String>,
    /// Violations, for `ValidationFailed`
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport {
            name: self.name(),
            message: self.to_string(),
            chain: self.chain(),
            details: match self {
                Self::ValidationFailed { details, .. } => Some(details),
                _ => None,
            },
        };

        // Minimal body for routers mounted without the boundary; the boundary
        // replaces it with the full envelope.
        let body = serde_json::json!({
            "success": false,
            "error": {
                "name": report.name,
                "message": report.message,
                "statusCode": status.as_u16(),
            }
        });

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
