//! paytill gateway HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p paytill-gateway --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p paytill-gateway
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p paytill-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to TOML configuration file (default: `config.toml`)
//! - `HOST` — Override bind address (default: `0.0.0.0`)
//! - `PORT` — Override port (default: `4650`)
//! - `RUST_LOG` — Log level filter (default: `info`)
//! - Any `$VAR` referenced by the config file (e.g. `WEBHOOK_SECRET`)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use paytill::ledger::PaymentLedger;
use paytill::notify::NotificationLog;
use paytill_svm::rpc::SolanaNetwork;

use paytill_gateway::config::GatewayConfig;
use paytill_gateway::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        rpc = %config.rpc_url,
        storefronts = config.storefronts.len(),
        "Loaded configuration"
    );

    let fees = config.fee_config()?;
    if fees.enabled() {
        tracing::info!(fee_bps = fees.fee_bps(), "Platform fee routing enabled");
    } else {
        tracing::info!("Platform fee routing disabled");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured — signature verification is OFF");
    }
    if config.storefronts.is_empty() {
        tracing::warn!("No storefronts configured — checkout endpoints will return 404");
    }

    let directory = config.directory()?;
    let state = Arc::new(AppState {
        ledger: Arc::new(PaymentLedger::new()),
        notifications: Arc::new(NotificationLog::new()),
        directory: Arc::new(directory),
        network: Arc::new(SolanaNetwork::new(config.rpc_url.clone())),
        fees,
        tokens: config.token_registry()?,
        webhook_secret: config.webhook_secret.clone(),
    });

    let app = paytill_gateway::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
