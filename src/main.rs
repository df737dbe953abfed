use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marquee::store::Stores;
use marquee::{AppState, Config, build_router, metrics, server};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("starting marquee v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        limiter_enabled = config.rate_limit_enabled,
        "configuration loaded"
    );

    // Prometheus exporter on its own port, if enabled
    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_exporter(metrics_addr);
    }

    // Build application state and router
    let grace = config.shutdown_grace;
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(Stores::in_memory(), config);
    let app = build_router(state.clone());

    // Bind and serve with graceful shutdown
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    server::serve(app, listener, grace, server::shutdown_signal())
        .await
        .map_err(|e| {
            error!("server error: {e}");
            exitcode::SOFTWARE
        })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks");
    state.shutdown().await;

    info!("server shutdown complete");
    Ok(())
}
