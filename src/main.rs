use idempotency_service::api::{create_router, AppState};
use idempotency_service::config::Settings;
use idempotency_service::idempotency::IdempotencyHandlerConfig;
use idempotency_service::observability::{init_logging, init_metrics, LogConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig::from(&settings.logging));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // The idempotency store lives as long as this state.
    let state = AppState::in_memory(IdempotencyHandlerConfig::from(&settings.idempotency))
        .with_metrics(metrics_handle);
    let app = create_router(state);

    let address = settings.application.address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        "Listening on {} (idempotency header: {})",
        address, settings.idempotency.header_name
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
