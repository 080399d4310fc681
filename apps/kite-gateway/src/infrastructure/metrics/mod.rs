//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticker**: Ticks received, reconnects, errors, running state
//! - **Subscriptions**: Instruments requested and prices cached
//! - **Broker**: REST calls to the broker by endpoint and outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the gateway port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the first handle.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "kite_gateway_ticks_received_total",
        "Total ticks received from the Kite ticker"
    );
    describe_counter!(
        "kite_gateway_ticker_reconnects_total",
        "Total ticker reconnection attempts"
    );
    describe_counter!(
        "kite_gateway_ticker_errors_total",
        "Total ticker errors by kind"
    );
    describe_counter!(
        "kite_gateway_resubscribe_failures_total",
        "Live resubscription requests that could not be sent"
    );
    describe_counter!(
        "kite_gateway_broker_requests_total",
        "Broker REST requests by endpoint and outcome"
    );

    describe_gauge!(
        "kite_gateway_ticker_running",
        "1 while the ticker stream is running"
    );
    describe_gauge!(
        "kite_gateway_subscribed_instruments",
        "Number of instruments in the subscription set"
    );
    describe_gauge!(
        "kite_gateway_prices_cached",
        "Number of instruments with a known last price"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for broker requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Request succeeded.
    Success,
    /// Broker rejected the access token.
    Unauthorized,
    /// Any other failure.
    Failure,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unauthorized => "unauthorized",
            Self::Failure => "failure",
        }
    }
}

/// Record ticks received in one batch.
pub fn record_ticks_received(count: usize) {
    counter!("kite_gateway_ticks_received_total").increment(count as u64);
}

/// Record a ticker reconnection attempt.
pub fn record_reconnect() {
    counter!("kite_gateway_ticker_reconnects_total").increment(1);
}

/// Record a ticker error.
pub fn record_ticker_error(kind: &'static str) {
    counter!("kite_gateway_ticker_errors_total", "kind" => kind).increment(1);
}

/// Record a resubscription request that could not be delivered.
pub fn record_resubscribe_failure() {
    counter!("kite_gateway_resubscribe_failures_total").increment(1);
}

/// Record a broker REST request.
pub fn record_broker_request(endpoint: &'static str, outcome: Outcome) {
    counter!(
        "kite_gateway_broker_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Update the ticker running gauge.
pub fn set_ticker_running(running: bool) {
    gauge!("kite_gateway_ticker_running").set(if running { 1.0 } else { 0.0 });
}

/// Update the subscription set size.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_instruments(count: usize) {
    gauge!("kite_gateway_subscribed_instruments").set(count as f64);
}

/// Update the number of cached prices.
#[allow(clippy::cast_precision_loss)]
pub fn set_prices_cached(count: usize) {
    gauge!("kite_gateway_prices_cached").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
