//! Kite Connect Adapters
//!
//! - `rest`: HTTP client for login and portfolio endpoints
//! - `ticker`: WebSocket transport for live market data
//! - `codec`: Ticker frame encoding and decoding
//! - `reconnect`: Exponential backoff for the ticker

pub mod auth;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod rest;
pub mod ticker;

pub use codec::{BinaryFrame, CodecError, TickerCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest::KiteClient;
pub use ticker::{KiteTicker, KiteTickerConfig};
