//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: Streaming session to the Kite ticker
//! - `BrokerPort`: Broker REST API (login, profile, portfolio)
//! - `TokenRepository`: Access token persistence

mod broker_port;
mod stream_transport;
mod token_repository;

#[cfg(test)]
pub use broker_port::MockBrokerPort;
pub use broker_port::{BrokerError, BrokerPort};
pub use stream_transport::{
    SessionHandle, StreamTransport, TickerCommand, TickerEvent, TransportChannels, TransportError,
    session_channels,
};
#[cfg(test)]
pub use token_repository::MockTokenRepository;
pub use token_repository::{TokenRepository, TokenStoreError};
