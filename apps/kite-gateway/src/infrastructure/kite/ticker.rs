//! Kite Ticker WebSocket Transport
//!
//! Implements [`StreamTransport`] over the Kite ticker WebSocket.
//!
//! # Stream URL
//!
//! `wss://ws.kite.trade?api_key=...&access_token=...`
//!
//! # Protocol
//!
//! Commands go out as JSON text frames; market data comes in as binary
//! frames, with a one-byte heartbeat every second. Errors and broadcasts
//! come in as JSON text frames.
//!
//! # Reconnection
//!
//! Socket errors, close frames, read timeouts and failed connects all
//! consume the reconnect budget. A successful connect restores it. When the
//! budget is spent the session emits [`TickerEvent::Closed`] carrying the
//! last close code seen and ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{BinaryFrame, TickerCodec};
use super::messages::ServerMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    StreamTransport, TickerCommand, TickerEvent, TransportChannels, TransportError,
};
use crate::domain::session::SessionCredentials;
use crate::infrastructure::config::{GatewayConfig, TickerSettings};
use crate::infrastructure::metrics;

/// Close code for a connection lost without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code for a close frame without a status.
const NO_STATUS: u16 = 1005;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the ticker transport.
#[derive(Debug, Clone)]
pub struct KiteTickerConfig {
    /// Ticker endpoint without credentials.
    pub url: Url,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Silence after which the connection is considered dropped.
    pub read_timeout: std::time::Duration,
}

impl KiteTickerConfig {
    /// Build the transport configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker URL cannot be parsed.
    pub fn new(url: &str, settings: &TickerSettings) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            reconnect: ReconnectConfig::from_ticker_settings(settings),
            read_timeout: settings.read_timeout,
        })
    }

    /// Build the transport configuration from the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker URL cannot be parsed.
    pub fn from_gateway_config(config: &GatewayConfig) -> Result<Self, TransportError> {
        Self::new(&config.kite.ticker_url, &config.ticker)
    }
}

impl ReconnectConfig {
    /// Backoff configuration for the ticker settings.
    #[must_use]
    pub fn from_ticker_settings(settings: &TickerSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            max_attempts: settings.max_reconnect_attempts,
            ..Self::default()
        }
    }
}

// =============================================================================
// Ticker
// =============================================================================

/// WebSocket transport for the Kite ticker.
#[derive(Debug, Clone)]
pub struct KiteTicker {
    config: KiteTickerConfig,
    codec: TickerCodec,
}

/// Per-session channel endpoints.
struct Session<'a> {
    commands: &'a mut mpsc::UnboundedReceiver<TickerCommand>,
    events: &'a mpsc::Sender<TickerEvent>,
    cancel: &'a CancellationToken,
}

impl KiteTicker {
    /// Create a transport.
    #[must_use]
    pub const fn new(config: KiteTickerConfig) -> Self {
        Self {
            config,
            codec: TickerCodec::new(),
        }
    }

    fn session_url(&self, credentials: &SessionCredentials) -> Url {
        let mut url = self.config.url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", credentials.api_key())
            .append_pair("access_token", credentials.access_token());
        url
    }

    /// Connect and pump frames until cancelled or the connection drops.
    ///
    /// `Ok` means the consumer ended the session.
    async fn connect_and_run(
        &self,
        url: &Url,
        session: &mut Session<'_>,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), TransportError> {
        tracing::info!(url = %self.config.url, "Connecting to Kite ticker");

        let connected = tokio::select! {
            biased;
            () = session.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };
        let (ws_stream, _response) = connected.map_err(connect_error)?;
        policy.reset();

        let (mut write, mut read) = ws_stream.split();
        if session.events.send(TickerEvent::Connected).await.is_err() {
            return Ok(());
        }

        loop {
            tokio::select! {
                biased;
                () = session.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                command = session.commands.recv() => {
                    let Some(command) = command else {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    };
                    tracing::debug!(command = ?command, "Sending ticker command");
                    let text = self
                        .codec
                        .encode(command)
                        .map_err(|e| TransportError::Protocol(e.to_string()))?;
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(socket_error)?;
                }
                frame = tokio::time::timeout(self.config.read_timeout, read.next()) => {
                    let message = match frame {
                        Err(_) => return Err(TransportError::ReadTimeout(self.config.read_timeout)),
                        Ok(None) => {
                            return Err(TransportError::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: "stream ended".to_string(),
                            });
                        }
                        Ok(Some(Err(e))) => return Err(socket_error(e)),
                        Ok(Some(Ok(message))) => message,
                    };

                    match message {
                        Message::Binary(data) => self.handle_binary(&data, session.events).await,
                        Message::Text(text) => self.handle_text(text.as_str(), session.events).await,
                        Message::Ping(data) => {
                            write.send(Message::Pong(data)).await.map_err(socket_error)?;
                        }
                        Message::Close(frame) => {
                            let (code, reason) = frame.map_or_else(
                                || (NO_STATUS, String::new()),
                                |f| (u16::from(f.code), f.reason.as_str().to_string()),
                            );
                            tracing::info!(code, reason = %reason, "Ticker sent close frame");
                            return Err(TransportError::Closed { code, reason });
                        }
                        Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    async fn handle_binary(&self, data: &[u8], events: &mpsc::Sender<TickerEvent>) {
        match self.codec.decode_binary(data) {
            Ok(BinaryFrame::Heartbeat) => tracing::trace!("Ticker heartbeat"),
            Ok(BinaryFrame::Ticks(ticks)) => {
                if !ticks.is_empty() {
                    let _ = events.send(TickerEvent::Ticks(ticks)).await;
                }
            }
            Err(error) => {
                metrics::record_ticker_error("codec");
                let _ = events
                    .send(TickerEvent::Error {
                        code: None,
                        reason: error.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn handle_text(&self, text: &str, events: &mpsc::Sender<TickerEvent>) {
        match self.codec.decode_text(text) {
            Ok(ServerMessage::Error(reason)) => {
                let _ = events.send(TickerEvent::Error { code: None, reason }).await;
            }
            Ok(ServerMessage::Message(message)) => {
                tracing::info!(message = %message, "Ticker message");
            }
            Ok(ServerMessage::Order(_)) => tracing::debug!("Ignoring order update"),
            Ok(ServerMessage::Unknown(kind)) => {
                tracing::debug!(kind = %kind, "Ignoring ticker text frame");
            }
            Err(error) => tracing::debug!(error = %error, "Unparsable ticker text frame"),
        }
    }
}

#[async_trait]
impl StreamTransport for KiteTicker {
    async fn run(&self, credentials: SessionCredentials, channels: TransportChannels) {
        let TransportChannels {
            mut commands,
            events,
            cancel,
        } = channels;
        let url = self.session_url(&credentials);
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut session = Session {
            commands: &mut commands,
            events: &events,
            cancel: &cancel,
        };

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Ticker session cancelled");
                return;
            }

            let error = match self.connect_and_run(&url, &mut session, &mut policy).await {
                Ok(()) => {
                    tracing::info!("Ticker session closed by consumer");
                    return;
                }
                Err(error) => error,
            };
            tracing::warn!(error = %error, "Ticker connection lost");

            let Some(delay) = policy.next_delay() else {
                let (code, reason) = match error {
                    TransportError::Closed { code, reason } => (code, reason),
                    other => (ABNORMAL_CLOSURE, other.to_string()),
                };
                tracing::error!(
                    attempts = policy.attempt_count(),
                    code,
                    "Ticker reconnect attempts exhausted"
                );
                let _ = events.send(TickerEvent::Closed { code, reason }).await;
                return;
            };

            let attempt = policy.attempt_count();
            let _ = events
                .send(TickerEvent::Reconnecting { attempt, delay })
                .await;

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Ticker session cancelled during reconnect delay");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn connect_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Http(response) => TransportError::Handshake {
            status: response.status().as_u16(),
        },
        other => TransportError::Connect(other.to_string()),
    }
}

fn socket_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed {
                code: ABNORMAL_CLOSURE,
                reason: error.to_string(),
            }
        }
        other => TransportError::Protocol(other.to_string()),
    }
}
