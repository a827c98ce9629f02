//! Journey tracker server.
//!
//! This binary:
//! - Loads configuration from `.env` and the environment
//! - Connects the configured storage and message bus
//! - Serves the HTTP/WebSocket API and the Prometheus scrape endpoint
//! - Drains in-flight requests and closes live subscriptions on shutdown
//!
//! # Usage
//!
//! ```bash
//! # In-memory backends
//! cargo run -p journey-tracker-web
//!
//! # PostgreSQL storage
//! STORAGE_BACKEND=postgres DATABASE_URL=postgres://localhost/journeys cargo run -p journey-tracker-web
//! ```

use anyhow::Context;
use journey_tracker_runtime::metrics::MetricsServer;
use journey_tracker_web::{
    bootstrap::build_service, build_router, metrics_router, AppState, Config,
    TrustedHeaderIdentity,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "journey_tracker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        addr = %config.server.addr(),
        storage = ?config.storage,
        bus = ?config.bus,
        "Starting journey tracker"
    );

    let shutdown = CancellationToken::new();

    if config.metrics.enabled {
        start_metrics(&config, shutdown.clone()).await?;
    }

    let service = build_service(&config).await?;
    let identity = Arc::new(TrustedHeaderIdentity::new(config.identity_header.clone()));
    let state = AppState::new(service, identity)
        .with_allowed_origin(config.allowed_origin.clone())
        .with_shutdown(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.server.addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr()))?;
    info!("Server listening on {}", config.server.addr());

    let router = build_router(state);
    let drained = shutdown.clone().cancelled_owned();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(drained)
            .await
    });

    shutdown_signal().await;
    shutdown.cancel();

    match tokio::time::timeout(config.server.shutdown_timeout, server).await {
        Ok(result) => result.context("Server task failed")??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout.as_secs(),
            "Shutdown timeout elapsed with requests still in flight"
        ),
    }

    info!("Server stopped");
    Ok(())
}

/// Install the Prometheus recorder and serve `/metrics` until shutdown.
async fn start_metrics(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = config
        .metrics
        .addr()
        .parse()
        .with_context(|| format!("Invalid metrics address {}", config.metrics.addr()))?;

    let mut metrics = MetricsServer::new(addr);
    metrics.start()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {addr}"))?;

    let router = metrics_router(Arc::new(metrics));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            warn!(error = %e, "Metrics server failed");
        }
    });
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for Ctrl+C (SIGINT), or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
