//! Stream Manager
//!
//! Owns the single live ticker session, the subscription set and the
//! last-traded-price table.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► Running ──(venue closes / retries exhausted)──► Closed
//!    ▲            │
//!    │          stop()
//!    │            ▼
//!    └─────── Stopped
//! ```
//!
//! Every `start` opens a new connection generation: the previous session is
//! closed, a fresh empty price table is installed and a worker task is
//! spawned to run the transport and dispatch its events. Workers from older
//! generations may still drain for a moment after a restart; they only ever
//! write to their own, abandoned price table and cannot touch the state of
//! the current generation.
//!
//! None of the public methods wait on the network. Failures inside the
//! worker surface only through [`StreamManager::is_running`] and logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{
    SessionHandle, StreamTransport, TickerCommand, TickerEvent, session_channels,
};
use crate::domain::session::SessionCredentials;
use crate::domain::ticker::{AtomicRunState, InstrumentToken, PriceTable, RunState, TickMode};
use crate::infrastructure::metrics;

/// Capacity of the event channel between transport and worker.
const EVENT_BUFFER: usize = 1024;

/// Manager of the live market data stream.
pub struct StreamManager {
    transport: Arc<dyn StreamTransport>,
    shared: Arc<Shared>,
}

/// State shared between callers and the worker.
struct Shared {
    state: AtomicRunState,
    generation: AtomicU64,
    connected: AtomicBool,
    prices: RwLock<Arc<PriceTable>>,
    subscriptions: RwLock<Vec<InstrumentToken>>,
    connection: Mutex<Option<Connection>>,
}

/// The live session of one generation.
struct Connection {
    generation: u64,
    session: SessionHandle,
    worker: JoinHandle<()>,
}

/// Snapshot of the manager for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StreamStatus {
    /// Lifecycle state.
    pub state: RunState,
    /// Whether the stream is running with a live worker.
    pub running: bool,
    /// Whether the venue has acknowledged the current connection.
    pub connected: bool,
    /// Subscribed instruments.
    pub subscriptions: Vec<InstrumentToken>,
    /// Instruments with a known price.
    pub prices_cached: usize,
}

impl StreamManager {
    /// Create a stopped manager on top of a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                state: AtomicRunState::new(RunState::Stopped),
                generation: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                prices: RwLock::new(Arc::new(PriceTable::new())),
                subscriptions: RwLock::new(Vec::new()),
                connection: Mutex::new(None),
            }),
        }
    }

    /// Start streaming `instruments`, replacing any running session.
    ///
    /// Returns as soon as the worker is spawned. Connection failures show
    /// up later through [`Self::is_running`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, credentials: SessionCredentials, instruments: Vec<InstrumentToken>) {
        let mut connection = self.shared.connection.lock();

        if let Some(previous) = connection.take() {
            tracing::info!(generation = previous.generation, "Replacing running ticker session");
            close_session(&previous.session);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let prices = Arc::new(PriceTable::new());
        *self.shared.prices.write() = Arc::clone(&prices);

        let count = instruments.len();
        *self.shared.subscriptions.write() = instruments;
        self.shared.connected.store(false, Ordering::Release);
        self.shared.state.store(RunState::Running);

        let (session, channels, events) = session_channels(EVENT_BUFFER);
        let worker = Worker {
            generation,
            shared: Arc::clone(&self.shared),
            prices,
            session: session.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move {
            tokio::join!(transport.run(credentials, channels), worker.dispatch(events));
        });

        *connection = Some(Connection {
            generation,
            session,
            worker: handle,
        });
        drop(connection);

        metrics::set_ticker_running(true);
        metrics::set_subscribed_instruments(count);
        metrics::set_prices_cached(0);
        tracing::info!(generation, instruments = count, "Ticker stream started");
    }

    /// Stop the stream. Safe to call in any state.
    ///
    /// Prices already received stay readable until the next `start`.
    pub fn stop(&self) {
        let mut connection = self.shared.connection.lock();
        self.shared.state.store(RunState::Stopped);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.connected.store(false, Ordering::Release);
        let previous = connection.take();
        drop(connection);

        if let Some(previous) = previous {
            close_session(&previous.session);
            tracing::info!(generation = previous.generation, "Ticker stream stopped");
        }
        metrics::set_ticker_running(false);
    }

    /// Latest known price of an instrument.
    #[must_use]
    pub fn get_price(&self, instrument: InstrumentToken) -> Option<f64> {
        self.current_prices().get(instrument)
    }

    /// Replace the subscription set.
    ///
    /// While running, the new set is also pushed to the live session in LTP
    /// mode. A push that cannot be delivered is logged and dropped; the
    /// stored set is updated regardless.
    pub fn update_subscriptions(&self, instruments: Vec<InstrumentToken>) {
        *self.shared.subscriptions.write() = instruments.clone();
        metrics::set_subscribed_instruments(instruments.len());

        if self.shared.state.load() != RunState::Running {
            return;
        }
        let session = self
            .shared
            .connection
            .lock()
            .as_ref()
            .map(|c| c.session.clone());
        let Some(session) = session else {
            return;
        };

        match subscribe_ltp(&session, instruments) {
            Ok(count) => tracing::info!(instruments = count, "Updated live subscriptions"),
            Err(error) => {
                metrics::record_resubscribe_failure();
                tracing::error!(error = %error, "Failed to update live subscriptions");
            }
        }
    }

    /// Whether the stream is running and its worker is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        if self.shared.state.load() != RunState::Running {
            return false;
        }
        self.shared
            .connection
            .lock()
            .as_ref()
            .is_some_and(|c| !c.worker.is_finished())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.shared.state.load()
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<InstrumentToken> {
        self.shared.subscriptions.read().clone()
    }

    /// Snapshot for status reporting.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.state(),
            running: self.is_running(),
            connected: self.shared.connected.load(Ordering::Acquire),
            subscriptions: self.subscriptions(),
            prices_cached: self.current_prices().len(),
        }
    }

    fn current_prices(&self) -> Arc<PriceTable> {
        Arc::clone(&self.shared.prices.read())
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("state", &self.shared.state.load().as_str())
            .field("generation", &self.shared.generation.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Event dispatcher of one connection generation.
struct Worker {
    generation: u64,
    shared: Arc<Shared>,
    prices: Arc<PriceTable>,
    session: SessionHandle,
}

impl Worker {
    async fn dispatch(self, mut events: mpsc::Receiver<TickerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TickerEvent::Connected => self.on_connected(),
                TickerEvent::Ticks(ticks) => {
                    self.prices.apply(&ticks);
                    metrics::record_ticks_received(ticks.len());
                    if self.is_current() {
                        metrics::set_prices_cached(self.prices.len());
                    }
                }
                TickerEvent::Error { code, reason } => {
                    metrics::record_ticker_error("venue");
                    tracing::error!(
                        generation = self.generation,
                        code = ?code,
                        reason = %reason,
                        "Ticker error"
                    );
                }
                TickerEvent::Reconnecting { attempt, delay } => {
                    if self.is_current() {
                        self.shared.connected.store(false, Ordering::Release);
                    }
                    metrics::record_reconnect();
                    tracing::warn!(
                        generation = self.generation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Ticker reconnecting"
                    );
                }
                TickerEvent::Closed { code, reason } => {
                    tracing::warn!(
                        generation = self.generation,
                        code,
                        reason = %reason,
                        "Ticker closed"
                    );
                    self.mark_closed();
                    return;
                }
            }
        }
        tracing::warn!(
            generation = self.generation,
            "Ticker event stream ended without a close"
        );
        self.mark_closed();
    }

    fn on_connected(&self) {
        if !self.is_current() {
            return;
        }
        self.shared.connected.store(true, Ordering::Release);

        let instruments = self.shared.subscriptions.read().clone();
        tracing::info!(
            generation = self.generation,
            instruments = instruments.len(),
            "Ticker connected"
        );
        if instruments.is_empty() {
            return;
        }
        if let Err(error) = subscribe_ltp(&self.session, instruments) {
            metrics::record_resubscribe_failure();
            tracing::error!(error = %error, "Failed to subscribe after connect");
        }
    }

    fn mark_closed(&self) {
        let mut connection = self.shared.connection.lock();
        if connection
            .as_ref()
            .is_some_and(|c| c.generation == self.generation)
        {
            connection.take();
            self.shared.state.store(RunState::Closed);
            self.shared.connected.store(false, Ordering::Release);
            metrics::set_ticker_running(false);
        }
    }

    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::Acquire) == self.generation
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn subscribe_ltp(
    session: &SessionHandle,
    instruments: Vec<InstrumentToken>,
) -> Result<usize, crate::application::ports::TransportError> {
    let count = instruments.len();
    session.send(TickerCommand::Subscribe(instruments.clone()))?;
    session.send(TickerCommand::SetMode(TickMode::Ltp, instruments))?;
    Ok(count)
}

fn close_session(session: &SessionHandle) {
    if let Err(error) = session.close() {
        tracing::debug!(error = %error, "Ignoring ticker close failure");
    }
}
