//! Configuration Module
//!
//! Configuration loading for the gateway.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_FRONTEND_URL, GatewayConfig, KiteEndpoints, ServerSettings,
    TickerSettings,
};
