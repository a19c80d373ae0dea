//! # kvcache API Server
//!
//! Binary entry point for the cache API service.

use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kvcache_api::{AppState, Config, ServiceInfo, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        version = kvcache_api::VERSION,
        mode = ?config.mode,
        "Starting kvcache API"
    );

    // Connection failures are fatal: no degraded start
    let cache = kvcache_client::connect(&config.redis.dsn)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Cannot reach Redis, aborting startup");
            e
        })?;

    let state = AppState::new(cache, ServiceInfo::from_config(&config), config.mode)?;
    if state.metrics.is_some() {
        tracing::info!("Request metrics enabled on /metrics");
    }
    let app = build_router(state, &config.cors_origins);

    // Start server
    let addr = config.server_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout))
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, then arms a hard deadline for draining
async fn shutdown_signal(drain_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    tokio::spawn(async move {
        tokio::time::sleep(drain_timeout).await;
        tracing::warn!(?drain_timeout, "Drain deadline exceeded, exiting");
        std::process::exit(1);
    });
}
