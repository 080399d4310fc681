//! Kite Gateway Binary
//!
//! Starts the broker gateway HTTP server and, when a valid token is stored,
//! the live market data stream.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kite-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `API_KEY`: Kite Connect API key
//! - `SECRET_KEY`: Kite Connect API secret
//!
//! ## Optional
//! - `DATABASE_URL`: SQLite path (default: `kite_gateway.db`)
//! - `FRONTEND_URL`: Where the login callback redirects
//! - `GATEWAY_HOST` / `GATEWAY_PORT`: Listen address (default: 127.0.0.1:8001)
//! - `KITE_API_URL`, `KITE_LOGIN_URL`, `KITE_TICKER_URL`: Broker endpoints
//! - `TICKER_RECONNECT_INITIAL_DELAY_MS`, `TICKER_RECONNECT_MAX_DELAY_SECS`,
//!   `TICKER_RECONNECT_MAX_ATTEMPTS`, `TICKER_READ_TIMEOUT_SECS`: Ticker tuning
//! - `HTTP_TIMEOUT_SECS`: Broker REST timeout
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use kite_gateway::application::ports::TokenRepository;
use kite_gateway::infrastructure::http::{AppState, GatewayServer};
use kite_gateway::infrastructure::kite::{KiteClient, KiteTicker, KiteTickerConfig};
use kite_gateway::infrastructure::persistence::SqliteTokenStore;
use kite_gateway::infrastructure::telemetry;
use kite_gateway::{GatewayConfig, GatewayService, StreamManager, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for in-flight requests after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Kite gateway");

    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let store = Arc::new(
        SqliteTokenStore::open(&config.database_path).context("opening token store")?,
    );
    match store.delete_expired(Utc::now()) {
        Ok(removed) => tracing::debug!(removed, "Expired tokens purged"),
        Err(e) => tracing::warn!(error = %e, "Could not purge expired tokens"),
    }

    let broker = Arc::new(KiteClient::new(&config).context("building Kite client")?);
    let ticker_config =
        KiteTickerConfig::from_gateway_config(&config).context("configuring Kite ticker")?;
    let stream = Arc::new(StreamManager::new(Arc::new(KiteTicker::new(ticker_config))));
    let gateway = Arc::new(GatewayService::new(broker, store, stream));

    match gateway.resume_stream().await {
        Ok(true) => tracing::info!("Ticker resumed from stored token"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Could not resume ticker"),
    }

    let addr = config.server.bind_addr()?;
    let shutdown_token = CancellationToken::new();
    let state = Arc::new(AppState::new(Arc::clone(&gateway), config.frontend_url));
    let server = GatewayServer::new(addr, state, shutdown_token.clone());
    let mut server_task = tokio::spawn(server.run());

    tracing::info!("Kite gateway ready");

    tokio::select! {
        () = await_shutdown() => {}
        result = &mut server_task => {
            gateway.shutdown();
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(anyhow::anyhow!("server task failed: {e}")),
            };
        }
    }

    shutdown_token.cancel();
    gateway.shutdown();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await {
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server error during shutdown"),
        Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
        Err(_) => tracing::warn!("Shutdown timed out"),
        Ok(Ok(Ok(()))) => {}
    }

    tracing::info!("Kite gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        database = %config.database_path,
        frontend = %config.frontend_url,
        "Configuration loaded"
    );
    tracing::debug!(
        api_url = %config.kite.api_url,
        ticker_url = %config.kite.ticker_url,
        max_reconnect_attempts = config.ticker.max_reconnect_attempts,
        "Kite endpoints"
    );
}

/// Load `.env` from the current directory or the nearest ancestor holding one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(env_path) = cwd
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(".env"))
        .find(|path| path.exists())
    {
        let _ = dotenvy::from_path(&env_path);
    }
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }
}
