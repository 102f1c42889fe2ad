//! Ledger Webhook - WhatsApp Cloud API webhook receiver.
//!
//! This binary:
//! - Answers the subscription handshake
//! - Verifies signed deliveries
//! - Resolves the tenant and forwards the event to the backend
//! - Always answers the provider quickly

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ledger_relay::web::router;
use ledger_relay::{AppState, Config, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        verify_token_configured = config.verify_token.is_some(),
        app_secret_configured = config.app_secret.is_some(),
        signature_fail_open = config.signature_fail_open,
        backend_ingest_url = ?config.backend_ingest_url.as_ref().map(|u| u.as_str()),
        backend_secret_configured = config.backend_shared_secret.is_some(),
        forward_mode = %config.forward_mode,
        forward_timeout_ms = config.forward_timeout.as_millis() as u64,
        simulate_enabled = config.simulate_enabled,
        "config_loaded"
    );

    if config.signature_fail_open {
        tracing::warn!("signature_fail_open_enabled_not_for_production");
    }

    let relay = Relay::from_config(&config).context("Failed to create HTTP client")?;
    info!(tenant_routes = relay.tenants().len(), "relay_created");

    let port = config.port;
    // Background forwards may run up to one client timeout after the last response.
    let drain_limit = config.forward_timeout + Duration::from_secs(1);
    let app = router(AppState::new(config, relay.clone()));

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    relay.drain(drain_limit).await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
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
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
