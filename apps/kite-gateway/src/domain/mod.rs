//! Domain Layer - Core types and business rules.
//!
//! Pure types for ticks, prices, portfolio figures and sessions. No I/O
//! happens in this layer.

/// Ticks, the price table and the stream run state.
pub mod ticker;

/// Profile, holdings, positions and the P&L summary.
pub mod portfolio;

/// Credentials, stored tokens and expiry rules.
pub mod session;
