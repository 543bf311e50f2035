//! Prometheus metrics for the reservation engine.
//!
//! This module provides metrics for:
//! - Coordinator RPC latency per operation
//! - Change feed apply latency
//! - Reservation lifecycle counters
//! - Feed traffic and reconnect counters

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Coordinator RPC latency metric name.
pub const METRIC_RPC_LATENCY: &str = "coordinator_rpc_latency_ms";
/// Feed event apply latency metric name.
pub const METRIC_FEED_APPLY_LATENCY: &str = "feed_apply_latency_ms";
/// Reservations upserted counter metric name.
pub const METRIC_RESERVATIONS_UPSERTED: &str = "reservations_upserted_total";
/// Reservations committed counter metric name.
pub const METRIC_RESERVATIONS_COMMITTED: &str = "reservations_committed_total";
/// Reservations cancelled counter metric name.
pub const METRIC_RESERVATIONS_CANCELLED: &str = "reservations_cancelled_total";
/// Advisory errors counter metric name.
pub const METRIC_ADVISORY_ERRORS: &str = "advisory_errors_total";
/// Feed events received counter metric name.
pub const METRIC_FEED_EVENTS_RECEIVED: &str = "feed_events_received_total";
/// Own-session feed events discarded counter metric name.
pub const METRIC_FEED_EVENTS_DISCARDED: &str = "feed_events_discarded_total";
/// Feed reconnects counter metric name.
pub const METRIC_FEED_RECONNECTS: &str = "feed_reconnects_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_RPC_LATENCY,
        "Coordinator RPC latency in milliseconds"
    );
    describe_histogram!(
        METRIC_FEED_APPLY_LATENCY,
        "Change feed event apply latency in milliseconds"
    );

    // Counters
    describe_counter!(
        METRIC_RESERVATIONS_UPSERTED,
        "Total number of reservation upserts acknowledged"
    );
    describe_counter!(
        METRIC_RESERVATIONS_COMMITTED,
        "Total number of reservation commits acknowledged"
    );
    describe_counter!(
        METRIC_RESERVATIONS_CANCELLED,
        "Total number of reservation cancellations acknowledged"
    );
    describe_counter!(
        METRIC_ADVISORY_ERRORS,
        "Total number of advisory-layer failures surfaced to operators"
    );
    describe_counter!(
        METRIC_FEED_EVENTS_RECEIVED,
        "Total number of change feed events received"
    );
    describe_counter!(
        METRIC_FEED_EVENTS_DISCARDED,
        "Total number of own-session feed events discarded"
    );
    describe_counter!(
        METRIC_FEED_RECONNECTS,
        "Total number of change feed reconnections"
    );

    debug!("Metrics initialized");
}

/// Record coordinator RPC latency for a named operation.
pub fn record_rpc_latency(start: Instant, operation: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_RPC_LATENCY, "operation" => operation).record(latency_ms);
}

/// Record change feed apply latency.
pub fn record_feed_apply_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FEED_APPLY_LATENCY).record(latency_ms);
}

/// Increment reservations upserted counter.
pub fn inc_reservations_upserted() {
    counter!(METRIC_RESERVATIONS_UPSERTED).increment(1);
}

/// Increment reservations committed counter.
pub fn inc_reservations_committed() {
    counter!(METRIC_RESERVATIONS_COMMITTED).increment(1);
}

/// Increment reservations cancelled counter.
pub fn inc_reservations_cancelled() {
    counter!(METRIC_RESERVATIONS_CANCELLED).increment(1);
}

/// Increment advisory errors counter.
pub fn inc_advisory_errors() {
    counter!(METRIC_ADVISORY_ERRORS).increment(1);
}

/// Increment feed events received counter.
pub fn inc_feed_events_received() {
    counter!(METRIC_FEED_EVENTS_RECEIVED).increment(1);
}

/// Increment own-session feed events discarded counter.
pub fn inc_feed_events_discarded() {
    counter!(METRIC_FEED_EVENTS_DISCARDED).increment(1);
}

/// Increment feed reconnects counter.
pub fn inc_feed_reconnects() {
    counter!(METRIC_FEED_RECONNECTS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}
