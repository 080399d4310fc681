//! Portfolio Types
//!
//! Account profile, holdings and positions as returned by the broker, plus
//! the aggregated P&L summary shown on the dashboard.
//!
//! Broker payloads carry many more fields than the gateway looks at. Every
//! type keeps the fields it does not know about in `extra` so the frontend
//! receives the broker's data unchanged.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ticker::InstrumentToken;

/// Account profile of the logged-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Broker user id.
    #[serde(default)]
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub user_name: String,
    /// Registered email.
    #[serde(default)]
    pub email: String,
    /// Remaining broker fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A long-term holding in the demat account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Exchange trading symbol.
    #[serde(default)]
    pub tradingsymbol: String,
    /// Exchange the holding is listed on.
    #[serde(default)]
    pub exchange: String,
    /// Ticker instrument token.
    #[serde(default)]
    pub instrument_token: InstrumentToken,
    /// Quantity held.
    #[serde(default)]
    pub quantity: i64,
    /// Average acquisition price.
    #[serde(default)]
    pub average_price: f64,
    /// Last traded price.
    #[serde(default)]
    pub last_price: f64,
    /// Unrealised profit and loss.
    #[serde(default)]
    pub pnl: f64,
    /// Remaining broker fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Holding {
    /// Replace the last price with a fresher one and recompute P&L.
    pub fn reprice(&mut self, last_price: f64) {
        self.last_price = last_price;
        #[allow(clippy::cast_precision_loss)]
        let quantity = self.quantity as f64;
        self.pnl = (last_price - self.average_price) * quantity;
    }
}

/// An intraday or carried-forward position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Exchange trading symbol.
    #[serde(default)]
    pub tradingsymbol: String,
    /// Exchange the position is on.
    #[serde(default)]
    pub exchange: String,
    /// Ticker instrument token.
    #[serde(default)]
    pub instrument_token: InstrumentToken,
    /// Net quantity.
    #[serde(default)]
    pub quantity: i64,
    /// Average price.
    #[serde(default)]
    pub average_price: f64,
    /// Last traded price.
    #[serde(default)]
    pub last_price: f64,
    /// Profit and loss.
    #[serde(default)]
    pub pnl: f64,
    /// Remaining broker fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Positions grouped the way the broker returns them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Positions {
    /// Net positions across days.
    #[serde(default)]
    pub net: Vec<Position>,
    /// Today's positions.
    #[serde(default)]
    pub day: Vec<Position>,
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregated portfolio figures, rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Market value of all holdings.
    pub total_value: f64,
    /// Holdings P&L plus positions P&L.
    pub total_pnl: f64,
    /// Unrealised P&L of holdings.
    pub holdings_pnl: f64,
    /// Sum of position P&L.
    pub positions_pnl: f64,
    /// Number of holdings.
    pub holdings_count: usize,
    /// Number of net positions.
    pub positions_count: usize,
}

impl PortfolioSummary {
    /// Compute the summary from holdings and net positions.
    ///
    /// Sums run in decimal arithmetic so that rounding happens once, at the
    /// end.
    #[must_use]
    pub fn compute(holdings: &[Holding], positions: &[Position]) -> Self {
        let mut total_value = Decimal::ZERO;
        let mut holdings_pnl = Decimal::ZERO;

        for holding in holdings {
            let quantity = Decimal::from(holding.quantity);
            let current = to_decimal(holding.last_price) * quantity;
            let invested = to_decimal(holding.average_price) * quantity;
            total_value += current;
            holdings_pnl += current - invested;
        }

        let positions_pnl: Decimal = positions.iter().map(|p| to_decimal(p.pnl)).sum();

        Self {
            total_value: to_rounded_f64(total_value),
            total_pnl: to_rounded_f64(holdings_pnl + positions_pnl),
            holdings_pnl: to_rounded_f64(holdings_pnl),
            positions_pnl: to_rounded_f64(positions_pnl),
            holdings_count: holdings.len(),
            positions_count: positions.len(),
        }
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default()
}

fn to_rounded_f64(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or_default()
}

/// Instrument tokens of the given holdings, first occurrence order, no
/// duplicates and no zero tokens.
#[must_use]
pub fn instrument_tokens(holdings: &[Holding]) -> Vec<InstrumentToken> {
    let mut tokens = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let token = holding.instrument_token;
        if token != 0 && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}
