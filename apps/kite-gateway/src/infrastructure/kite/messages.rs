//! Kite Ticker Message Types
//!
//! JSON text frames exchanged with the ticker. Market data itself arrives
//! as binary frames and is handled by the codec.
//!
//! # Outbound
//!
//! ```json
//! {"a": "subscribe", "v": [408065, 884737]}
//! {"a": "mode", "v": ["ltp", [408065]]}
//! ```
//!
//! # Inbound
//!
//! ```json
//! {"type": "error", "data": "Invalid instrument token"}
//! {"type": "order", "data": {...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::ports::TickerCommand;
use crate::domain::ticker::{InstrumentToken, TickMode};

/// Action of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start streaming instruments.
    Subscribe,
    /// Stop streaming instruments.
    Unsubscribe,
    /// Change the mode of instruments.
    Mode,
}

/// Payload of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestValue {
    /// Plain token list.
    Tokens(Vec<InstrumentToken>),
    /// Mode followed by a token list.
    Mode(TickMode, Vec<InstrumentToken>),
}

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRequest {
    /// Action.
    #[serde(rename = "a")]
    pub action: Action,
    /// Payload.
    #[serde(rename = "v")]
    pub value: RequestValue,
}

impl From<TickerCommand> for ClientRequest {
    fn from(command: TickerCommand) -> Self {
        match command {
            TickerCommand::Subscribe(tokens) => Self {
                action: Action::Subscribe,
                value: RequestValue::Tokens(tokens),
            },
            TickerCommand::Unsubscribe(tokens) => Self {
                action: Action::Unsubscribe,
                value: RequestValue::Tokens(tokens),
            },
            TickerCommand::SetMode(mode, tokens) => Self {
                action: Action::Mode,
                value: RequestValue::Mode(mode, tokens),
            },
        }
    }
}

/// Raw inbound text frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTextMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload; a string for errors and messages, an object for orders.
    #[serde(default)]
    pub data: Value,
}

/// Classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Venue-side error. The connection stays open.
    Error(String),
    /// Informational broadcast.
    Message(String),
    /// Order update postback.
    Order(Value),
    /// Anything else.
    Unknown(String),
}

impl From<RawTextMessage> for ServerMessage {
    fn from(raw: RawTextMessage) -> Self {
        match raw.kind.as_str() {
            "error" => Self::Error(data_text(raw.data)),
            "message" => Self::Message(data_text(raw.data)),
            "order" => Self::Order(raw.data),
            _ => Self::Unknown(raw.kind),
        }
    }
}

fn data_text(data: Value) -> String {
    match data {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
