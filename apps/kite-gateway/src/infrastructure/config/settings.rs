//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Default frontend the OAuth callback redirects to.
pub const DEFAULT_FRONTEND_URL: &str =
    "https://canary-qunat.github.io/Rendering_Testing_for_frontend/";

/// Kite Connect application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Kite endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KiteEndpoints {
    /// REST API base URL.
    pub api_url: String,
    /// Login page URL.
    pub login_url: String,
    /// Ticker WebSocket URL.
    pub ticker_url: String,
}

impl Default for KiteEndpoints {
    fn default() -> Self {
        Self {
            api_url: "https://api.kite.trade".to_string(),
            login_url: "https://kite.zerodha.com/connect/login".to_string(),
            ticker_url: "wss://ws.kite.trade".to_string(),
        }
    }
}

/// Ticker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerSettings {
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_initial: Duration,
    /// Ceiling for any reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Consecutive reconnection attempts before the session is closed.
    pub max_reconnect_attempts: u32,
    /// Silence after which the connection is considered dropped.
    pub read_timeout: Duration,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_HOST".to_string(),
                value: self.host.clone(),
            })
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Application credentials.
    pub credentials: Credentials,
    /// Path of the SQLite token database.
    pub database_path: String,
    /// Frontend the login callback redirects to.
    pub frontend_url: String,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Kite endpoints.
    pub kite: KiteEndpoints,
    /// Ticker settings.
    pub ticker: TickerSettings,
    /// Timeout for broker REST calls.
    pub http_timeout: Duration,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `API_KEY` or `SECRET_KEY` is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = required(&lookup, "API_KEY")?;
        let api_secret = required(&lookup, "SECRET_KEY")?;

        let database_path = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .map_or_else(|| "kite_gateway.db".to_string(), |v| sqlite_path(&v));

        let frontend_url = lookup("FRONTEND_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            host: lookup("GATEWAY_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or(server_defaults.host),
            port: parse_or(&lookup, "GATEWAY_PORT", server_defaults.port),
        };

        let kite_defaults = KiteEndpoints::default();
        let kite = KiteEndpoints {
            api_url: lookup("KITE_API_URL").unwrap_or(kite_defaults.api_url),
            login_url: lookup("KITE_LOGIN_URL").unwrap_or(kite_defaults.login_url),
            ticker_url: lookup("KITE_TICKER_URL").unwrap_or(kite_defaults.ticker_url),
        };

        let ticker_defaults = TickerSettings::default();
        let ticker = TickerSettings {
            reconnect_delay_initial: parse_or(
                &lookup,
                "TICKER_RECONNECT_INITIAL_DELAY_MS",
                None,
            )
            .map_or(ticker_defaults.reconnect_delay_initial, Duration::from_millis),
            reconnect_delay_max: parse_or(&lookup, "TICKER_RECONNECT_MAX_DELAY_SECS", None)
                .map_or(ticker_defaults.reconnect_delay_max, Duration::from_secs),
            max_reconnect_attempts: parse_or(
                &lookup,
                "TICKER_RECONNECT_MAX_ATTEMPTS",
                ticker_defaults.max_reconnect_attempts,
            ),
            read_timeout: parse_or(&lookup, "TICKER_READ_TIMEOUT_SECS", None)
                .map_or(ticker_defaults.read_timeout, Duration::from_secs),
        };

        let http_timeout = parse_or(&lookup, "HTTP_TIMEOUT_SECS", None)
            .map_or(Duration::from_secs(10), Duration::from_secs);

        Ok(Self {
            credentials: Credentials::new(api_key, api_secret),
            database_path,
            frontend_url,
            server,
            kite,
            ticker,
            http_timeout,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

/// Parse `key`, falling back to `default` when unset or unparsable.
///
/// With an `Option` default this yields `Some` only for parsable values.
fn parse_or<T: ParseDefault>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| T::parse_value(v.trim()))
        .unwrap_or(default)
}

trait ParseDefault: Sized {
    fn parse_value(raw: &str) -> Option<Self>;
}

impl ParseDefault for u16 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseDefault for u32 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseDefault for Option<u64> {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok().map(Some)
    }
}

/// Strip a `sqlite://` or `sqlite:` scheme from a database URL.
fn sqlite_path(url: &str) -> String {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![("API_KEY", "kite_key"), ("SECRET_KEY", "kite_secret")]
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&minimal())).unwrap();

        assert_eq!(config.credentials.api_key(), "kite_key");
        assert_eq!(config.credentials.api_secret(), "kite_secret");
        assert_eq!(config.database_path, "kite_gateway.db");
        assert_eq!(config.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(config.server, ServerSettings::default());
        assert_eq!(config.kite, KiteEndpoints::default());
        assert_eq!(config.ticker, TickerSettings::default());
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn missing_api_key_is_error() {
        let err = GatewayConfig::from_lookup(lookup(&[("SECRET_KEY", "s")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "API_KEY"));
    }

    #[test]
    fn empty_secret_is_error() {
        let err =
            GatewayConfig::from_lookup(lookup(&[("API_KEY", "k"), ("SECRET_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "SECRET_KEY"));
    }

    #[test]
    fn overrides_are_read() {
        let mut pairs = minimal();
        pairs.extend([
            ("DATABASE_URL", "sqlite:///var/lib/kite/tokens.db"),
            ("FRONTEND_URL", "http://localhost:3000/"),
            ("GATEWAY_HOST", "0.0.0.0"),
            ("GATEWAY_PORT", "9000"),
            ("KITE_TICKER_URL", "ws://127.0.0.1:9999"),
            ("TICKER_RECONNECT_MAX_DELAY_SECS", "3"),
            ("TICKER_RECONNECT_MAX_ATTEMPTS", "4"),
            ("TICKER_RECONNECT_INITIAL_DELAY_MS", "50"),
            ("TICKER_READ_TIMEOUT_SECS", "30"),
            ("HTTP_TIMEOUT_SECS", "2"),
        ]);
        let config = GatewayConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.database_path, "/var/lib/kite/tokens.db");
        assert_eq!(config.frontend_url, "http://localhost:3000/");
        assert_eq!(config.server.bind_addr().unwrap().to_string(), "0.0.0.0:9000");
        assert_eq!(config.kite.ticker_url, "ws://127.0.0.1:9999");
        assert_eq!(config.ticker.reconnect_delay_max, Duration::from_secs(3));
        assert_eq!(config.ticker.max_reconnect_attempts, 4);
        assert_eq!(config.ticker.reconnect_delay_initial, Duration::from_millis(50));
        assert_eq!(config.ticker.read_timeout, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let mut pairs = minimal();
        pairs.extend([("GATEWAY_PORT", "eighty"), ("TICKER_READ_TIMEOUT_SECS", "-1")]);
        let config = GatewayConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.server.port, 8001);
        assert_eq!(config.ticker.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn sqlite_scheme_is_stripped() {
        assert_eq!(sqlite_path("sqlite://tokens.db"), "tokens.db");
        assert_eq!(sqlite_path("sqlite:tokens.db"), "tokens.db");
        assert_eq!(sqlite_path("tokens.db"), "tokens.db");
    }

    #[test]
    fn invalid_host_is_reported() {
        let settings = ServerSettings {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(matches!(
            settings.bind_addr(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
