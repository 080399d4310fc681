//! Live Market Data Types
//!
//! Ticks decoded from the Kite ticker, the last-traded-price table fed by
//! them, and the lifecycle flag of the stream manager.
//!
//! # Price Table
//!
//! The table holds last-known-value semantics only: one price per
//! instrument, last write wins, no history and no eviction. A table belongs
//! to one connection generation; a restart swaps in a fresh, empty table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Numeric identifier of a tradable instrument on the ticker.
pub type InstrumentToken = u32;

/// Streaming mode requested for a set of instruments.
///
/// Controls which fields the venue pushes per instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Last traded price only.
    #[default]
    Ltp,
    /// Price, volume and OHLC without depth.
    Quote,
    /// Everything including market depth.
    Full,
}

/// A single decoded market data update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Instrument the update belongs to.
    pub instrument_token: InstrumentToken,
    /// Mode the packet was sent in.
    pub mode: TickMode,
    /// Whether the instrument is tradable (indices are not).
    pub tradable: bool,
    /// Last traded price, when the packet carries one.
    pub last_price: Option<f64>,
}

impl Tick {
    /// Build an LTP-mode tick with a price.
    #[must_use]
    pub const fn ltp(instrument_token: InstrumentToken, last_price: f64) -> Self {
        Self {
            instrument_token,
            mode: TickMode::Ltp,
            tradable: true,
            last_price: Some(last_price),
        }
    }
}

// =============================================================================
// Price Table
// =============================================================================

/// Thread-safe map of instrument token to last traded price.
///
/// Written by the stream worker only; read by any number of concurrent
/// callers. Reads take a short read lock and never touch the network.
#[derive(Debug, Default)]
pub struct PriceTable {
    prices: RwLock<HashMap<InstrumentToken, f64>>,
}

impl PriceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest price for an instrument, if one has been seen.
    #[must_use]
    pub fn get(&self, instrument_token: InstrumentToken) -> Option<f64> {
        self.prices.read().get(&instrument_token).copied()
    }

    /// Apply a batch of ticks in order.
    ///
    /// Ticks without a price are skipped. Returns the number of entries
    /// written.
    pub fn apply(&self, ticks: &[Tick]) -> usize {
        let mut prices = self.prices.write();
        let mut written = 0;
        for tick in ticks {
            if let Some(price) = tick.last_price {
                prices.insert(tick.instrument_token, price);
                written += 1;
            }
        }
        written
    }

    /// Number of instruments with a known price.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no price has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Lifecycle of the stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No stream requested.
    #[default]
    Stopped,
    /// A stream was started and has not terminated.
    Running,
    /// The venue closed the session for good.
    Closed,
}

impl RunState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Closed,
            _ => Self::Stopped,
        }
    }

    /// Label used in logs and status responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

/// Atomic cell holding a [`RunState`], shared between callers and the worker.
#[derive(Debug, Default)]
pub struct AtomicRunState(AtomicU8);

impl AtomicRunState {
    /// Create a cell in the given state.
    #[must_use]
    pub const fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    /// Current state.
    #[must_use]
    pub fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the state.
    pub fn store(&self, state: RunState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}
