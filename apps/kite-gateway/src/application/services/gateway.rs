//! Gateway Service
//!
//! Orchestrates the broker, the token store and the stream manager on
//! behalf of the HTTP layer: login completion, authenticated portfolio
//! reads and the dashboard view with live prices.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::stream_manager::{StreamManager, StreamStatus};
use crate::application::ports::{BrokerError, BrokerPort, TokenRepository, TokenStoreError};
use crate::domain::portfolio::{Holding, PortfolioSummary, Position, Profile, instrument_tokens};
use crate::domain::session::{SessionCredentials, TokenInfo};
use crate::domain::ticker::InstrumentToken;

/// Gateway service error.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No usable access token.
    #[error("Not authenticated. Please login at /kite-login")]
    NotAuthenticated,

    /// The broker call failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The token store failed.
    #[error(transparent)]
    Store(#[from] TokenStoreError),
}

/// Result of `/auth/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    /// Whether a valid token exists and the broker accepts it.
    pub authenticated: bool,
    /// Human readable status.
    pub message: String,
    /// Basic user details when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

/// Identifying fields of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// Broker user id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Email.
    pub email: String,
}

/// Everything the dashboard renders.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    /// User profile.
    pub profile: Profile,
    /// Holdings with live prices applied.
    pub holdings: Vec<Holding>,
    /// Net positions.
    pub positions: Vec<Position>,
    /// Aggregated figures.
    pub summary: PortfolioSummary,
}

/// Application service behind the HTTP API.
pub struct GatewayService {
    broker: Arc<dyn BrokerPort>,
    tokens: Arc<dyn TokenRepository>,
    stream: Arc<StreamManager>,
}

impl GatewayService {
    /// Create the service.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        tokens: Arc<dyn TokenRepository>,
        stream: Arc<StreamManager>,
    ) -> Self {
        Self {
            broker,
            tokens,
            stream,
        }
    }

    /// Broker login URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.broker.login_url()
    }

    /// Exchange the request token, persist the access token and start the
    /// stream on the user's holdings.
    ///
    /// Returns the number of instruments streamed.
    ///
    /// # Errors
    ///
    /// Fails if the exchange or the save fails. A failure to load holdings
    /// only leaves the stream without instruments.
    pub async fn complete_login(&self, request_token: &str) -> Result<usize, GatewayError> {
        let access_token = self.broker.generate_session(request_token).await?;
        let stored = self.tokens.save(&access_token, Utc::now())?;
        tracing::info!(token_id = stored.id, expires = %stored.expired_at, "Access token saved");

        let holdings = self.holdings_or_empty(&access_token).await;
        let instruments = instrument_tokens(&holdings);
        let count = instruments.len();
        self.stream.start(self.credentials(access_token), instruments);
        Ok(count)
    }

    /// Restart the stream from a stored token, if one is valid.
    ///
    /// Returns whether the stream was started.
    ///
    /// # Errors
    ///
    /// Fails only if the token store fails.
    pub async fn resume_stream(&self) -> Result<bool, GatewayError> {
        let Some(token) = self.tokens.latest_valid(Utc::now())? else {
            tracing::info!("No valid stored token, ticker stays stopped until login");
            return Ok(false);
        };
        let holdings = self.holdings_or_empty(&token.access_token).await;
        let instruments = instrument_tokens(&holdings);
        if instruments.is_empty() {
            tracing::info!("No holdings to stream");
            return Ok(false);
        }
        self.stream
            .start(self.credentials(token.access_token), instruments);
        Ok(true)
    }

    /// Authentication status for the frontend.
    ///
    /// # Errors
    ///
    /// Fails only if the token store fails.
    pub async fn auth_status(&self) -> Result<AuthStatus, GatewayError> {
        match self.profile().await {
            Ok(profile) => Ok(AuthStatus {
                authenticated: true,
                message: "Valid token found in database".to_string(),
                user: Some(UserSummary {
                    user_id: profile.user_id,
                    user_name: profile.user_name,
                    email: profile.email,
                }),
            }),
            Err(GatewayError::NotAuthenticated) => Ok(AuthStatus {
                authenticated: false,
                message: "No valid token found. Please login.".to_string(),
                user: None,
            }),
            Err(other) => Err(other),
        }
    }

    /// Profile of the logged-in user.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when there is no valid token or the broker refuses
    /// it.
    pub async fn profile(&self) -> Result<Profile, GatewayError> {
        let access_token = self.access_token()?;
        self.broker.profile(&access_token).await.map_err(|error| {
            tracing::warn!(error = %error, "Profile request failed");
            GatewayError::NotAuthenticated
        })
    }

    /// Holdings of the logged-in user; empty if the broker call fails.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when there is no valid token.
    pub async fn holdings(&self) -> Result<Vec<Holding>, GatewayError> {
        let access_token = self.access_token()?;
        Ok(self.holdings_or_empty(&access_token).await)
    }

    /// Net positions of the logged-in user; empty if the broker call fails.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when there is no valid token.
    pub async fn positions(&self) -> Result<Vec<Position>, GatewayError> {
        let access_token = self.access_token()?;
        Ok(self.net_positions_or_empty(&access_token).await)
    }

    /// Profile, holdings with live prices, net positions and summary.
    ///
    /// A running stream is resubscribed when the holdings changed.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when there is no valid token or the broker refuses
    /// the profile call.
    pub async fn dashboard(&self) -> Result<DashboardData, GatewayError> {
        let access_token = self.access_token()?;
        let profile = self.profile().await?;
        let mut holdings = self.holdings_or_empty(&access_token).await;
        let positions = self.net_positions_or_empty(&access_token).await;

        self.sync_subscriptions(&holdings);

        for holding in &mut holdings {
            if let Some(price) = self.stream.get_price(holding.instrument_token) {
                holding.reprice(price);
            }
        }

        let summary = PortfolioSummary::compute(&holdings, &positions);
        tracing::info!(
            holdings = summary.holdings_count,
            positions = summary.positions_count,
            total_value = summary.total_value,
            total_pnl = summary.total_pnl,
            "Dashboard data assembled"
        );

        Ok(DashboardData {
            profile,
            holdings,
            positions,
            summary,
        })
    }

    /// Diagnostic info about the stored token.
    ///
    /// # Errors
    ///
    /// Fails if the token store fails.
    pub fn token_info(&self) -> Result<TokenInfo, GatewayError> {
        Ok(self
            .tokens
            .latest()?
            .map_or_else(TokenInfo::missing, |token| {
                TokenInfo::from_token(&token, Utc::now())
            }))
    }

    /// Live price of an instrument.
    #[must_use]
    pub fn ltp(&self, instrument: InstrumentToken) -> Option<f64> {
        self.stream.get_price(instrument)
    }

    /// Stream status.
    #[must_use]
    pub fn ticker_status(&self) -> StreamStatus {
        self.stream.status()
    }

    /// Whether the token store answers.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.tokens.ping().is_ok()
    }

    /// Stop the stream.
    pub fn shutdown(&self) {
        self.stream.stop();
    }

    // -------------------------------------------------------------------------

    fn access_token(&self) -> Result<String, GatewayError> {
        self.tokens
            .latest_valid(Utc::now())?
            .map(|token| token.access_token)
            .ok_or(GatewayError::NotAuthenticated)
    }

    fn credentials(&self, access_token: String) -> SessionCredentials {
        SessionCredentials::new(self.broker.api_key(), access_token)
    }

    async fn holdings_or_empty(&self, access_token: &str) -> Vec<Holding> {
        self.broker
            .holdings(access_token)
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "Holdings request failed");
                Vec::new()
            })
    }

    async fn net_positions_or_empty(&self, access_token: &str) -> Vec<Position> {
        self.broker
            .positions(access_token)
            .await
            .map(|positions| positions.net)
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "Positions request failed");
                Vec::new()
            })
    }

    /// Push the current holdings to a running stream.
    ///
    /// A stream that is stopped or closed is left alone; only login and
    /// resume start it.
    fn sync_subscriptions(&self, holdings: &[Holding]) {
        let instruments = instrument_tokens(holdings);
        if instruments.is_empty() || !self.stream.is_running() {
            return;
        }

        let current: HashSet<InstrumentToken> = self.stream.subscriptions().into_iter().collect();
        let wanted: HashSet<InstrumentToken> = instruments.iter().copied().collect();
        if current != wanted {
            self.stream.update_subscriptions(instruments);
        }
    }
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
