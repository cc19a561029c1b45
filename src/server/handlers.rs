//! Route handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::{Method, Uri};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthIdentity;
use crate::controller;
use crate::error::{GatewayError, Result};
use crate::server::GatewayState;
use crate::types::{Envelope, ModelDescriptor, ModelOutput};
use crate::upload::UploadPolicy;
use crate::validation::ValidatedInvocation;

/// Body of the read-only model routes.
#[derive(Debug, Serialize)]
pub struct Listing<T> {
    /// Always `true`
    pub success: bool,
    /// Payload
    pub data: T,
    /// Item count, for lists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// `GET /models/{model_id}` payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetail {
    /// Factory descriptor
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    /// Registered input schema, if any
    pub input_schema: Option<Value>,
    /// Upload policy computed at registration, if uploads are accepted
    pub file_upload: Option<UploadPolicy>,
}

/// `GET /health` payload.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `ok`
    pub status: &'static str,
    /// Registered strategies
    pub models: usize,
    /// Server time
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
pub async fn health(State(state): State<GatewayState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        models: state.factory().len(),
        timestamp: Utc::now(),
    })
}

/// `GET /models`
pub async fn list_models(
    State(state): State<GatewayState>,
) -> Json<Listing<Vec<ModelDescriptor>>> {
    let models = state.factory().list();
    Json(Listing {
        success: true,
        total: Some(models.len()),
        data: models,
    })
}

/// `GET /models/{model_id}`
pub async fn get_model(
    State(state): State<GatewayState>,
    Path(model_id): Path<String>,
) -> Result<Json<Listing<ModelDetail>>> {
    let descriptor = state
        .factory()
        .describe(&model_id)
        .ok_or_else(|| GatewayError::ModelNotAvailable(model_id.clone()))?;
    let registered = state.schemas().get(&model_id);

    Ok(Json(Listing {
        success: true,
        data: ModelDetail {
            descriptor,
            input_schema: registered.as_ref().map(|entry| entry.schema().clone()),
            file_upload: registered.and_then(|entry| entry.upload_policy().cloned()),
        },
        total: None,
    }))
}

/// `POST /models/{model_id}/invoke`
pub async fn invoke_model(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AuthIdentity>,
    invocation: ValidatedInvocation,
) -> Result<Json<Envelope<ModelOutput>>> {
    let ValidatedInvocation { model_id, input } = invocation;
    controller::invoke(&state, &model_id, input, &identity)
        .await
        .map(Json)
}

/// Unknown routes.
pub async fn fallback(method: Method, uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("Route {method} {} not found", uri.path()))
}
