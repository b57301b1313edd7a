// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};

/// Register all Tether metric descriptions.
///
/// Called once at startup after a recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "tether_queue_requests_total",
        "Queued request outcomes by drain pass"
    );
    describe_gauge!("tether_queue_depth", "Requests waiting in the offline queue");
    describe_counter!(
        "tether_transport_reconnects_total",
        "Scheduled reconnect attempts that fired"
    );
    describe_counter!(
        "tether_transport_outbound_dropped_total",
        "Buffered outbound messages evicted by the drop-oldest policy"
    );
    describe_counter!(
        "tether_transport_messages_total",
        "Messages sent and received over the real-time connection"
    );
}

/// Record the outcome of one queued request attempt.
pub fn record_queue_outcome(outcome: &'static str) {
    metrics::counter!("tether_queue_requests_total", "outcome" => outcome).increment(1);
}

/// Set the current queue depth.
pub fn set_queue_depth(depth: u64) {
    metrics::gauge!("tether_queue_depth").set(depth as f64);
}

/// Record a reconnect attempt.
pub fn record_reconnect() {
    metrics::counter!("tether_transport_reconnects_total").increment(1);
}

/// Record an outbound message evicted from the buffer.
pub fn record_outbound_dropped() {
    metrics::counter!("tether_transport_outbound_dropped_total").increment(1);
}

/// Record a message crossing the connection.
pub fn record_message(direction: &'static str) {
    metrics::counter!("tether_transport_messages_total", "direction" => direction).increment(1);
}
