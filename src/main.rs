use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_relay::api::rest::{cors_layer, router};
use delivery_relay::config::Config;
use delivery_relay::error::AppError;
use delivery_relay::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    if config.uses_default_secret() {
        tracing::warn!("JWT_SECRET is unset, signing tokens with the development default");
    }
    if !config.store_url.starts_with("memory://") {
        return Err(AppError::Internal(format!(
            "unsupported STORE_URL {:?}, only memory:// is available",
            config.store_url
        )));
    }

    let shared_state = Arc::new(AppState::new(&config));
    let app = router(shared_state).layer(cors_layer(&config.cors_origin)?);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        event_buffer_size = config.event_buffer_size,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
