//! Prometheus metrics for the consumer pipeline

use prometheus::{register_gauge, register_histogram, register_int_counter, register_int_gauge};
use prometheus::{Encoder, Gauge, Histogram, IntCounter, IntGauge, TextEncoder};

lazy_static::lazy_static! {
    pub static ref EVENTS_PROCESSED: IntCounter = register_int_counter!(
        "consumer_events_processed_total",
        "Events in committed batches"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref INVALID_ENTRIES: IntCounter = register_int_counter!(
        "consumer_invalid_entries_total",
        "Stream entries rejected by validation"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref PERSIST_ERRORS: IntCounter = register_int_counter!(
        "consumer_persist_errors_total",
        "Events in batches that were rolled back"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref DUPLICATE_EVENTS: IntCounter = register_int_counter!(
        "consumer_duplicate_events_total",
        "Committed events whose row already existed"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref DEAD_LETTERED: IntCounter = register_int_counter!(
        "consumer_dead_lettered_total",
        "Entries moved to the dead-letter stream"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref GROUP_LAG: IntGauge = register_int_gauge!(
        "consumer_group_lag",
        "Entries not yet delivered to the consumer group"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref STREAM_LENGTH: IntGauge = register_int_gauge!(
        "consumer_stream_length",
        "Total entries in the event stream"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref PROCESSING_RATE: Gauge = register_gauge!(
        "consumer_processing_rate",
        "Events per second over the last monitor window"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref BATCH_DURATION: Histogram = register_histogram!(
        "consumer_batch_duration_seconds",
        "Time to persist and acknowledge one batch",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Encode every registered collector in the Prometheus text format.
pub fn render() -> prometheus::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
