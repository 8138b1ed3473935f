//! # Andon Runtime
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging + metrics registry)
//! 2. Load and validate configuration (file, then environment)
//! 3. Build the relay, the Andon service and their adapters
//! 4. Start maintenance loops and the escalation dispatcher
//! 5. Serve HTTP/WebSocket until Ctrl+C or SIGTERM
//! 6. Stop loops and exit

use anyhow::{Context, Result};
use andon_runtime::{AndonNode, RuntimeConfig};
use andon_telemetry::{init_telemetry, TelemetryConfig};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let addr = config.bind_addr()?;

    info!("===========================================");
    info!("  Andon Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(
        max_connections = config.relay.connections.max_connections,
        rate_limit = config.relay.rate_limit.max_messages,
        rate_limit_enabled = config.relay.rate_limit.enabled,
        lines = config.lines.len(),
        "Configuration loaded"
    );

    let node = AndonNode::new(&config);
    node.start().await.context("Failed to start services")?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    let served = axum::serve(listener, node.router())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await;

    info!("Initiating graceful shutdown...");
    node.stop().await;
    info!("Shutdown complete");

    if let Err(e) = &served {
        error!(error = %e, "Server exited with an error");
    }
    served.context("HTTP server failed")
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
