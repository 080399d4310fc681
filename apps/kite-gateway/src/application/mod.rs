//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (ticker, broker, token store).
pub mod ports;

/// Application services: stream manager and gateway orchestration.
pub mod services;
