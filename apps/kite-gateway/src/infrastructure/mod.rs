//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the HTTP surface and process-wide observability.

/// Kite Connect REST client and ticker WebSocket transport.
pub mod kite;

/// SQLite token storage.
pub mod persistence;

/// Environment configuration.
pub mod config;

/// Frontend API server.
pub mod http;

/// Health check and metrics endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
