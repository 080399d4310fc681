//! Shared fakes for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kite_gateway::application::ports::{BrokerError, BrokerPort};
use kite_gateway::domain::portfolio::{Holding, Positions, Profile};
use kite_gateway::domain::session::SessionCredentials;
use kite_gateway::{StreamTransport, TickerCommand, TickerEvent, TransportChannels};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Transport
// =============================================================================

/// Transport that hands every session to the test and then idles until the
/// session is closed.
pub struct ScriptedTransport {
    sessions: mpsc::UnboundedSender<ScriptedSession>,
}

/// One session as seen by the venue side.
pub struct ScriptedSession {
    pub credentials: SessionCredentials,
    pub channels: TransportChannels,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedSession>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { sessions }), rx)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn run(&self, credentials: SessionCredentials, channels: TransportChannels) {
        let cancel = channels.cancel.clone();
        let _ = self.sessions.send(ScriptedSession {
            credentials,
            channels,
        });
        cancel.cancelled().await;
    }
}

impl ScriptedSession {
    pub async fn emit(&self, event: TickerEvent) {
        self.channels.events.send(event).await.unwrap();
    }

    pub async fn next_command(&mut self) -> TickerCommand {
        tokio::time::timeout(WAIT, self.channels.commands.recv())
            .await
            .expect("command in time")
            .expect("command channel open")
    }

    pub fn try_command(&mut self) -> Option<TickerCommand> {
        self.channels.commands.try_recv().ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.channels.cancel.is_cancelled()
    }
}

pub async fn next_session(rx: &mut mpsc::UnboundedReceiver<ScriptedSession>) -> ScriptedSession {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("session in time")
        .expect("transport alive")
}

/// Poll `condition` until it holds or the wait expires.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

// =============================================================================
// Broker
// =============================================================================

pub const API_KEY: &str = "test-key";
pub const GOOD_REQUEST_TOKEN: &str = "good-request";
pub const ACCESS_TOKEN: &str = "access-token-0123456789";

/// Broker that accepts one request token and one access token.
pub struct FakeBroker {
    holdings: Mutex<Vec<Holding>>,
}

impl FakeBroker {
    pub fn new(holdings: Vec<Holding>) -> Arc<Self> {
        Arc::new(Self {
            holdings: Mutex::new(holdings),
        })
    }

    pub fn set_holdings(&self, holdings: Vec<Holding>) {
        *self.holdings.lock() = holdings;
    }

    fn authorize(access_token: &str) -> Result<(), BrokerError> {
        if access_token == ACCESS_TOKEN {
            Ok(())
        } else {
            Err(BrokerError::TokenRejected("Incorrect `api_key` or `access_token`.".to_string()))
        }
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    fn login_url(&self) -> String {
        format!("https://kite.example/connect/login?v=3&api_key={API_KEY}")
    }

    fn api_key(&self) -> String {
        API_KEY.to_string()
    }

    async fn generate_session(&self, request_token: &str) -> Result<String, BrokerError> {
        if request_token == GOOD_REQUEST_TOKEN {
            Ok(ACCESS_TOKEN.to_string())
        } else {
            Err(BrokerError::TokenRejected("Token is invalid or has expired.".to_string()))
        }
    }

    async fn profile(&self, access_token: &str) -> Result<Profile, BrokerError> {
        Self::authorize(access_token)?;
        Ok(serde_json::from_value(json!({
            "user_id": "AB1234",
            "user_name": "Test User",
            "email": "test@example.com",
            "broker": "ZERODHA",
        }))
        .unwrap())
    }

    async fn holdings(&self, access_token: &str) -> Result<Vec<Holding>, BrokerError> {
        Self::authorize(access_token)?;
        Ok(self.holdings.lock().clone())
    }

    async fn positions(&self, access_token: &str) -> Result<Positions, BrokerError> {
        Self::authorize(access_token)?;
        Ok(serde_json::from_value(json!({
            "net": [{"tradingsymbol": "NIFTY26MARFUT", "instrument_token": 9001, "quantity": 50, "pnl": 1250.5}],
            "day": [],
        }))
        .unwrap())
    }
}

pub fn holding(symbol: &str, instrument_token: u32, quantity: i64, average: f64, last: f64) -> Holding {
    serde_json::from_value(json!({
        "tradingsymbol": symbol,
        "exchange": "NSE",
        "instrument_token": instrument_token,
        "quantity": quantity,
        "average_price": average,
        "last_price": last,
        "pnl": (last - average) * quantity as f64,
        "isin": "INE000000000",
    }))
    .unwrap()
}
