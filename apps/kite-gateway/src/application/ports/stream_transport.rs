//! Stream Transport Port (Driven Port)
//!
//! Interface to the streaming venue. A transport runs one session: it
//! connects, reconnects on recoverable drops, executes commands sent by the
//! consumer and reports lifecycle events back over a channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::session::SessionCredentials;
use crate::domain::ticker::{InstrumentToken, Tick, TickMode};

/// Request sent to a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerCommand {
    /// Start streaming the given instruments.
    Subscribe(Vec<InstrumentToken>),
    /// Stop streaming the given instruments.
    Unsubscribe(Vec<InstrumentToken>),
    /// Change the streaming mode of the given instruments.
    SetMode(TickMode, Vec<InstrumentToken>),
}

/// Lifecycle notification from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerEvent {
    /// The venue accepted the connection.
    Connected,
    /// A batch of ticks, in wire order.
    Ticks(Vec<Tick>),
    /// A non-fatal error; the session stays open.
    Error {
        /// Venue or transport error code, if any.
        code: Option<u16>,
        /// Description.
        reason: String,
    },
    /// The connection dropped and a retry is scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The session is over. No further events follow.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the venue.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Venue refused the WebSocket upgrade.
    #[error("handshake rejected with HTTP {status}")]
    Handshake {
        /// HTTP status code of the refusal.
        status: u16,
    },

    /// Venue closed the connection.
    #[error("connection closed ({code}): {reason}")]
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Nothing was received within the read timeout.
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// Socket or protocol failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session handle was used after the session ended.
    #[error("session already closed")]
    SessionClosed,
}

/// Control handle of a running session, held by the consumer.
///
/// Closing the handle is the session's cancellation signal: it unblocks the
/// transport's receive loop and ends the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<TickerCommand>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Create a handle from its command sender and cancellation token.
    #[must_use]
    pub const fn new(
        commands: mpsc::UnboundedSender<TickerCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self { commands, cancel }
    }

    /// Queue a command for the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session was closed or the transport
    /// has exited.
    pub fn send(&self, command: TickerCommand) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::SessionClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| TransportError::SessionClosed)
    }

    /// Close the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session was already closed.
    pub fn close(&self) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::SessionClosed);
        }
        self.cancel.cancel();
        Ok(())
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Transport side of a session's channels.
#[derive(Debug)]
pub struct TransportChannels {
    /// Commands from the consumer.
    pub commands: mpsc::UnboundedReceiver<TickerCommand>,
    /// Events to the consumer.
    pub events: mpsc::Sender<TickerEvent>,
    /// Fired when the consumer closes the session.
    pub cancel: CancellationToken,
}

/// Create a connected pair of session handle and transport channels.
#[must_use]
pub fn session_channels(
    event_buffer: usize,
) -> (SessionHandle, TransportChannels, mpsc::Receiver<TickerEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(event_buffer);
    let cancel = CancellationToken::new();

    let handle = SessionHandle::new(command_tx, cancel.clone());
    let channels = TransportChannels {
        commands: command_rx,
        events: event_tx,
        cancel,
    };
    (handle, channels, event_rx)
}

/// Port for the streaming venue.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Run one session until it is closed by the consumer or by the venue.
    ///
    /// Returns when `channels.cancel` fires or after emitting
    /// [`TickerEvent::Closed`].
    async fn run(&self, credentials: SessionCredentials, channels: TransportChannels);
}
