//! Prometheus metrics for the synchronization engine
//!
//! Process-wide counters; every client session in a process reports into the
//! same registry. Served by the store server at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Encoder, Gauge, TextEncoder};

lazy_static! {
    /// Counter: reconcile results by outcome
    pub static ref RECONCILES: CounterVec = register_counter_vec!(
        "inbox_sync_reconciles_total",
        "Reconcile attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to create reconciles metric");

    /// Counter: cue playback by outcome
    pub static ref CUE_PLAYS: CounterVec = register_counter_vec!(
        "inbox_sync_cue_total",
        "Audible cue requests by outcome",
        &["outcome"]
    )
    .expect("Failed to create cue metric");

    /// Counter: relay signals sent, received or failed
    pub static ref RELAY_SIGNALS: CounterVec = register_counter_vec!(
        "inbox_sync_relay_signals_total",
        "Cross-client relay signals by direction",
        &["direction"]
    )
    .expect("Failed to create relay_signals metric");

    /// Counter: read-state mutations by scope and result
    pub static ref MUTATIONS: CounterVec = register_counter_vec!(
        "inbox_sync_mutations_total",
        "Mark-read mutations by scope and result",
        &["scope", "result"]
    )
    .expect("Failed to create mutations metric");

    /// Gauge: unread count of the last published snapshot
    pub static ref UNREAD: Gauge = register_gauge!(
        "inbox_sync_unread_messages",
        "Unread count of the last published snapshot"
    )
    .expect("Failed to create unread metric");
}

/// Record a reconcile outcome
pub fn record_reconcile(outcome: &str) {
    RECONCILES.with_label_values(&[outcome]).inc();
}

/// Record a cue outcome
pub fn record_cue(outcome: &str) {
    CUE_PLAYS.with_label_values(&[outcome]).inc();
}

/// Record a relay signal
pub fn record_relay(direction: &str) {
    RELAY_SIGNALS.with_label_values(&[direction]).inc();
}

/// Record a mark-read mutation
pub fn record_mutation(scope: &str, result: &str) {
    MUTATIONS.with_label_values(&[scope, result]).inc();
}

/// Set the unread gauge
pub fn set_unread(count: usize) {
    UNREAD.set(count as f64);
}

/// Encode all metrics as Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
