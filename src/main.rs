use std::sync::Arc;

use driver_client::app::DriverApp;
use driver_client::capture::camera::NoCamera;
use driver_client::capture::location::UnsupportedPositionSource;
use driver_client::config::Config;
use driver_client::error::AppError;
use driver_client::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    // No capture devices on the host; the bundle uses the browser's.
    let app = DriverApp::from_config(
        &config,
        Arc::new(NoCamera),
        Arc::new(UnsupportedPositionSource),
    )?;
    let router = server::router(&config.static_dir, &config.base_path, app.state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        base_path = %config.base_path,
        static_dir = %config.static_dir.display(),
        api_base_url = %config.api_base_url,
        "static host started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
