//! Invocation controller
//!
//! `Received → Resolved(strategy) → Invoked → (Succeeded | Failed)`.
//!
//! The controller resolves a fresh strategy from the factory, builds the
//! process context from the caller identity, times the call and wraps the
//! output in the response envelope. Failures are logged with their elapsed
//! time and returned to the error boundary.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::auth::AuthIdentity;
use crate::error::{GatewayError, Result};
use crate::server::GatewayState;
use crate::types::{Envelope, EnvelopeMetadata, InvocationInput, ModelOutput};

/// Run one invocation of `model_id`.
pub async fn invoke(
    state: &GatewayState,
    model_id: &str,
    input: InvocationInput,
    identity: &AuthIdentity,
) -> Result<Envelope<ModelOutput>> {
    if model_id.trim().is_empty() {
        return Err(GatewayError::BadRequest("Model id is required".to_string()));
    }
    info!(
        model_id = %model_id,
        fields = input.body.len(),
        has_file = input.file.is_some(),
        files = input.files.as_ref().map_or(0, |files| files.len()),
        "invocation received"
    );

    if !state.factory().is_registered(model_id) {
        warn!(model_id = %model_id, "model not available");
        return Err(GatewayError::ModelNotAvailable(model_id.to_string()));
    }
    let mut strategy = state.factory().create(model_id)?;
    let context = identity.process_context();

    let started = Instant::now();
    let outcome = match state.invocation_timeout() {
        Some(limit) => match tokio::time::timeout(limit, strategy.process(input, context)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let timeout_ms = millis(limit);
                warn!(model_id = %model_id, timeout_ms, "invocation timed out");
                return Err(GatewayError::Timeout {
                    model_id: model_id.to_string(),
                    timeout_ms,
                });
            }
        },
        None => strategy.process(input, context).await,
    };
    let processing_time = millis(started.elapsed());

    match outcome {
        Ok(output) => {
            info!(model_id = %model_id, processing_time, "invocation succeeded");
            Ok(Envelope::ok(
                output,
                EnvelopeMetadata::new(model_id, processing_time),
            ))
        }
        Err(source) => {
            error!(
                model_id = %model_id,
                processing_time,
                error = %source,
                "invocation failed"
            );
            Err(GatewayError::Strategy {
                model_id: model_id.to_string(),
                source,
            })
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
