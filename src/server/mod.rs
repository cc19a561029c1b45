//! HTTP server
//!
//! Routes:
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | `GET` | `/health` | none |
//! | `GET` | `/models` | `models:read` |
//! | `GET` | `/models/{model_id}` | `models:read` |
//! | `POST` | `/models/{model_id}/invoke` | `models:invoke` |
//!
//! The error boundary wraps every route, so all errors except validation
//! rejections leave the server in the same envelope.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use static_assertions::assert_impl_all;
use tracing::{info, warn};

use crate::auth::{ApiKeyStore, require_api_key};
use crate::config::{Environment, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::registry::{SchemaRegistry, StrategyFactory};

/// Error boundary middleware
pub mod boundary;
/// Route handlers
pub mod handlers;

/// Shared state injected into every handler and middleware.
#[derive(Clone)]
pub struct GatewayState {
    factory: Arc<StrategyFactory>,
    schemas: Arc<SchemaRegistry>,
    api_keys: Arc<ApiKeyStore>,
    environment: Environment,
    invocation_timeout: Option<Duration>,
    body_limit: usize,
}

assert_impl_all!(GatewayState: Send, Sync, Clone);

impl GatewayState {
    /// Fresh, empty registries configured from `config`.
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_registries(
            config,
            Arc::new(StrategyFactory::new()),
            Arc::new(SchemaRegistry::with_upload_defaults(config.upload.clone())),
        )
    }

    /// State over existing registries.
    pub fn with_registries(
        config: &GatewayConfig,
        factory: Arc<StrategyFactory>,
        schemas: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            factory,
            schemas,
            api_keys: Arc::new(ApiKeyStore::new(config.api_keys.clone())),
            environment: config.environment,
            invocation_timeout: config.invocation_timeout,
            body_limit: config.body_limit,
        }
    }

    /// Strategy factory
    pub fn factory(&self) -> &StrategyFactory {
        &self.factory
    }

    /// Schema registry
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Accepted API keys
    pub fn api_keys(&self) -> &ApiKeyStore {
        &self.api_keys
    }

    /// Deployment environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Per-invocation timeout, if any
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout
    }

    /// Request body limit in bytes
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    let models = Router::new()
        .route("/models", get(handlers::list_models))
        .route("/models/{model_id}", get(handlers::get_model))
        .route("/models/{model_id}/invoke", post(handlers::invoke_model))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(models)
        .fallback(handlers::fallback)
        .layer(DefaultBodyLimit::max(state.body_limit()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            boundary::render_errors,
        ))
        .with_state(state)
}

/// Serve the gateway until Ctrl-C.
pub async fn serve(state: GatewayState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Configuration(format!("Failed to bind {addr}: {e}")))?;
    info!(
        %addr,
        models = state.factory().len(),
        auth = !state.api_keys().is_open(),
        "modelgate listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Internal(format!("Server error: {e}")))?;
    info!("modelgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "failed to listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
