//! Broker Port (Driven Port)
//!
//! Interface to the broker's REST API: login, session exchange and
//! read-only portfolio queries.

use async_trait::async_trait;

use crate::domain::portfolio::{Holding, Positions, Profile};

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The access token or request token was rejected.
    #[error("token rejected: {0}")]
    TokenRejected(String),

    /// The broker returned an error envelope.
    #[error("broker error {status} ({error_type}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Broker error class, e.g. `InputException`.
        error_type: String,
        /// Error message.
        message: String,
    },

    /// The request did not complete.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be parsed.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Port for broker interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// URL the user is redirected to for login.
    fn login_url(&self) -> String;

    /// The application's API key.
    fn api_key(&self) -> String;

    /// Exchange a request token for an access token.
    async fn generate_session(&self, request_token: &str) -> Result<String, BrokerError>;

    /// Profile of the user owning `access_token`.
    async fn profile(&self, access_token: &str) -> Result<Profile, BrokerError>;

    /// Long-term holdings.
    async fn holdings(&self, access_token: &str) -> Result<Vec<Holding>, BrokerError>;

    /// Net and day positions.
    async fn positions(&self, access_token: &str) -> Result<Positions, BrokerError>;
}
