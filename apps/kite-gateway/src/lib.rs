#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Kite Gateway - Broker OAuth Gateway with Live Prices
//!
//! A single-user gateway in front of the Kite Connect API. It completes the
//! broker's browser login, keeps the access token in SQLite, serves the
//! user's portfolio to a frontend, and keeps a live last-traded-price table
//! fed by the Kite ticker WebSocket.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types
//!   - `ticker`: Ticks, the price table, stream lifecycle state
//!   - `portfolio`: Holdings, positions, portfolio summary
//!   - `session`: Stored token and expiry rules
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream transport, broker API, token repository
//!   - `services`: `StreamManager` and `GatewayService`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kite`: Ticker WebSocket transport and REST client
//!   - `persistence`: SQLite token store
//!   - `http`, `health`: axum server
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                       ┌───────────────┐  start/stop   ┌────────────────┐
//! Browser ── HTTP ────► │ GatewayService│ ────────────► │ StreamManager  │
//!                       └──────┬────────┘  get_price    └───────┬────────┘
//!                              │ REST                           │ events
//!                              ▼                                ▼
//!                        Kite Connect API               Kite ticker WS
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::ticker::{InstrumentToken, PriceTable, RunState, Tick, TickMode};

// Ports
pub use application::ports::{
    SessionHandle, StreamTransport, TickerCommand, TickerEvent, TransportChannels,
    TransportError, session_channels,
};

// Services
pub use application::services::{GatewayError, GatewayService, StreamManager, StreamStatus};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
