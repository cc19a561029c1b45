use std::process::ExitCode;
use std::sync::Arc;

use modelgate::config::GatewayConfig;
use modelgate::error::GatewayError;
use modelgate::plugins::{load_from_dir, register_all};
use modelgate::server::{GatewayState, serve};
use modelgate::strategies::{builtin_catalog, builtin_plugins};
use modelgate::telemetry::init_subscriber;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "modelgate failed");
            eprintln!("modelgate: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), GatewayError> {
    let config = GatewayConfig::from_env()?;
    // Dropping the guard flushes the file appender.
    let _guard = init_subscriber(config.telemetry.clone())?;
    info!(environment = ?config.environment, "starting modelgate");
    if config.api_keys.is_empty() {
        warn!("no API keys configured, model routes are open");
    }

    let state = GatewayState::new(&config);
    register_all(state.factory(), state.schemas(), builtin_plugins());
    if let Some(dir) = &config.plugins_dir {
        load_from_dir(
            state.factory(),
            state.schemas(),
            dir,
            Arc::new(builtin_catalog()),
        )
        .await?;
    }

    serve(state, config.bind_addr).await
}
