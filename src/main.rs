// src/main.rs
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fanout_proxy::{
    config::Cli,
    metrics::MetricsRegistry,
    proxy::Proxy,
    registry::SharedRegistry,
    server::{AdminHandler, FanoutListener, MetricsHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fanout_proxy=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config = Cli::parse().into_config().await?;

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Build the registry; every backend starts active
    let registry = SharedRegistry::from_backends(config.backend_descriptors()?);
    let proxy = Arc::new(Proxy::new(registry, metrics, config.session_options()));

    let shutdown = CancellationToken::new();

    // Admin control plane, if enabled
    if let Some(addr) = config.admin_addr() {
        info!("starting httpd on port {}", addr.port());
        let server = ServerBuilder::new(
            addr,
            AdminHandler::new(proxy.clone(), metrics_registry.clone()),
        )
        .with_shutdown(shutdown.clone())
        .bind()
        .await?;
        tokio::spawn(server.serve());
    }

    // Standalone metrics endpoint, if enabled
    if let Some(addr) = config.metrics_addr() {
        let server = ServerBuilder::new(
            addr,
            MetricsHandler::new(metrics_registry.clone(), config.metrics.path.clone()),
        )
        .with_shutdown(shutdown.clone())
        .bind()
        .await?;
        info!("Metrics server listening on http://{}{}", addr, config.metrics.path);
        tokio::spawn(server.serve());
    }

    // Client listener; a bind failure ends the process
    info!("starting socket on port {}", config.listen_port);
    let listener = FanoutListener::bind(config.listen_addr(), proxy.clone()).await?;
    let listener_shutdown = listener.shutdown_token();
    let accept_loop = tokio::spawn(listener.serve());

    shutdown_signal().await;

    listener_shutdown.cancel();
    shutdown.cancel();
    let closed = proxy.close_all();
    info!("closed {} endpoints on shutdown", closed);

    if let Err(e) = accept_loop.await {
        error!("listener task failed: {}", e);
    }

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
