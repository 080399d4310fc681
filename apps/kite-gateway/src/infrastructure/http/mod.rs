//! HTTP API
//!
//! The frontend-facing API plus health and metrics endpoints, served by a
//! single axum server.
//!
//! # Endpoints
//!
//! - `GET /` - Service banner
//! - `GET /auth/status` - Whether a usable token is stored
//! - `GET /kite-login` - Redirect to the broker login page
//! - `GET /auth/callback` - Broker login redirect target
//! - `GET /api/profile`, `/api/holdings`, `/api/positions` - Portfolio reads
//! - `GET /api/dashboard-data` - Portfolio with live prices and summary
//! - `GET /api/ltp/{instrument_token}` - Live price of one instrument
//! - `GET /api/ticker/status` - Stream status
//! - `GET /debug/token-info` - Stored token diagnostics
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics` - See [`health`](crate::infrastructure::health)

mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

pub use error::ErrorBody;
pub use routes::{ApiResponse, CallbackParams, LtpResponse, TokenInfoResponse};

use crate::application::services::GatewayService;
use crate::infrastructure::health;

/// State shared by all handlers.
pub struct AppState {
    /// Application service.
    pub gateway: Arc<GatewayService>,
    /// Frontend the login callback redirects to.
    pub frontend_url: String,
    /// Gateway version reported by `/health`.
    pub version: String,
    /// Process start, for uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(gateway: Arc<GatewayService>, frontend_url: impl Into<String>) -> Self {
        Self {
            gateway,
            frontend_url: frontend_url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/auth/status", get(routes::auth_status))
        .route("/kite-login", get(routes::kite_login))
        .route("/auth/callback", get(routes::auth_callback))
        .route("/api/profile", get(routes::profile))
        .route("/api/holdings", get(routes::holdings))
        .route("/api/positions", get(routes::positions))
        .route("/api/dashboard-data", get(routes::dashboard_data))
        .route("/api/ltp/{instrument_token}", get(routes::ltp))
        .route("/api/ticker/status", get(routes::ticker_status))
        .route("/debug/token-info", get(routes::token_info))
        .merge(health::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server for the gateway.
pub struct GatewayServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a server.
    #[must_use]
    pub const fn new(addr: SocketAddr, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayServerError` if binding fails or the server fails
    /// while running.
    pub async fn run(self) -> Result<(), GatewayServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayServerError::BindFailed(self.addr, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayServerError` if the server fails while running.
    pub async fn serve(self, listener: TcpListener) -> Result<(), GatewayServerError> {
        let local = listener.local_addr().unwrap_or(self.addr);
        tracing::info!(addr = %local, "Gateway listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| GatewayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
