//! Kite REST Client
//!
//! Implements [`BrokerPort`] over the Kite Connect v3 HTTP API.
//!
//! Every response is wrapped in an envelope:
//!
//! ```json
//! {"status": "success", "data": {...}}
//! {"status": "error", "message": "...", "error_type": "TokenException"}
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::auth::{KITE_API_VERSION, authorization_header, login_url, session_checksum};
use crate::application::ports::{BrokerError, BrokerPort};
use crate::domain::portfolio::{Holding, Positions, Profile};
use crate::infrastructure::config::{Credentials, GatewayConfig};
use crate::infrastructure::metrics::{self, Outcome};

/// Error class Kite uses for invalid or expired tokens.
const TOKEN_EXCEPTION: &str = "TokenException";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_type: String,
}

#[derive(Debug, Deserialize)]
struct SessionData {
    access_token: String,
}

/// HTTP client for the Kite Connect API.
#[derive(Debug, Clone)]
pub struct KiteClient {
    client: Client,
    credentials: Credentials,
    api_url: String,
    login_url: String,
}

impl KiteClient {
    /// Create a client from the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| BrokerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            credentials: config.credentials.clone(),
            api_url: config.kite.api_url.trim_end_matches('/').to_string(),
            login_url: config.kite.login_url.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        access_token: &str,
    ) -> Result<T, BrokerError> {
        let request = self
            .client
            .get(format!("{}{path}", self.api_url))
            .header("X-Kite-Version", KITE_API_VERSION)
            .header(
                "Authorization",
                authorization_header(self.credentials.api_key(), access_token),
            );
        self.execute(endpoint, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BrokerError> {
        let result = send(request).await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(BrokerError::TokenRejected(_)) => Outcome::Unauthorized,
            Err(_) => Outcome::Failure,
        };
        metrics::record_broker_request(endpoint, outcome);
        if let Err(error) = &result {
            tracing::debug!(endpoint, error = %error, "Kite request failed");
        }
        result
    }
}

async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, BrokerError> {
    let response = request
        .send()
        .await
        .map_err(|e| BrokerError::Network(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BrokerError::Network(e.to_string()))?;

    if !status.is_success() {
        return Err(error_from_body(status, &body));
    }

    let envelope: Envelope<T> =
        serde_json::from_str(&body).map_err(|e| BrokerError::Decode(e.to_string()))?;
    if envelope.status != "success" {
        return Err(classify(status, envelope.error_type, envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| BrokerError::Decode("response has no data".to_string()))
}

fn error_from_body(status: StatusCode, body: &str) -> BrokerError {
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) => classify(status, envelope.error_type, envelope.message),
        Err(_) => classify(status, String::new(), body.to_string()),
    }
}

fn classify(status: StatusCode, error_type: String, message: String) -> BrokerError {
    if error_type == TOKEN_EXCEPTION || status == StatusCode::FORBIDDEN {
        return BrokerError::TokenRejected(message);
    }
    BrokerError::Api {
        status: status.as_u16(),
        error_type,
        message,
    }
}

#[async_trait]
impl BrokerPort for KiteClient {
    fn login_url(&self) -> String {
        login_url(&self.login_url, self.credentials.api_key())
    }

    fn api_key(&self) -> String {
        self.credentials.api_key().to_string()
    }

    async fn generate_session(&self, request_token: &str) -> Result<String, BrokerError> {
        let checksum = session_checksum(&self.credentials, request_token);
        let request = self
            .client
            .post(format!("{}/session/token", self.api_url))
            .header("X-Kite-Version", KITE_API_VERSION)
            .form(&[
                ("api_key", self.credentials.api_key()),
                ("request_token", request_token),
                ("checksum", checksum.as_str()),
            ]);
        let session: SessionData = self.execute("session_token", request).await?;
        Ok(session.access_token)
    }

    async fn profile(&self, access_token: &str) -> Result<Profile, BrokerError> {
        self.get("profile", "/user/profile", access_token).await
    }

    async fn holdings(&self, access_token: &str) -> Result<Vec<Holding>, BrokerError> {
        self.get("holdings", "/portfolio/holdings", access_token)
            .await
    }

    async fn positions(&self, access_token: &str) -> Result<Positions, BrokerError> {
        self.get("positions", "/portfolio/positions", access_token)
            .await
    }
}
