//! Commerce Service entry point.

use commerce_service::config::CommerceConfig;
use commerce_service::services::init_metrics;
use commerce_service::startup::Application;

use service_core::observability::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = CommerceConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing init error: {}", e)))?;
    init_metrics();
    log_startup(&config);

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    app.run_until(shutdown_signal()).await.inspect_err(|e| {
        tracing::error!(error = %e, "Server stopped with an error");
    })?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Secrets stay out of the log; only whether they are set.
fn log_startup(config: &CommerceConfig) {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service_name = %config.service_name,
        http_port = %config.common.port,
        otlp_endpoint = ?config.otlp_endpoint,
        db_max_connections = config.database.max_connections,
        db_min_connections = config.database.min_connections,
        signatures_required = config.signature.enabled,
        shared_order_throttle = config.throttle.shared,
        razorpay_configured = config.razorpay.is_configured(),
        "Starting commerce-service"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
