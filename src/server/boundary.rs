//! Error boundary
//!
//! [`GatewayError`](crate::error::GatewayError) responses carry an
//! [`ErrorReport`] extension. This middleware turns it into the error envelope,
//! adding the request path, method and, outside production, the source chain.
//! Responses without a report pass through untouched.

use axum::Json;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::{error, warn};

use crate::error::ErrorReport;
use crate::server::GatewayState;
use crate::types::{Envelope, ErrorBody};

/// Render [`ErrorReport`]s into the JSON error envelope.
pub async fn render_errors(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();

    let mut response = next.run(req).await;
    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    let status = response.status();
    if status.is_server_error() {
        error!(%method, %path, status = status.as_u16(), error = %report.message, "request failed");
    } else {
        warn!(%method, %path, status = status.as_u16(), error = %report.message, "request rejected");
    }

    let body = ErrorBody {
        name: report.name.to_string(),
        message: report.message,
        status_code: status.as_u16(),
        timestamp: Utc::now(),
        path: Some(path),
        method: Some(method),
        details: report.details,
        stack: (!state.environment().is_production()).then_some(report.chain),
    };
    let envelope: Envelope = Envelope::failed(body, None);
    (status, Json(envelope)).into_response()
}
