// External crates
use lazy_static::lazy_static;
use prometheus::{Gauge, IntCounter, IntGauge, register_gauge, register_int_counter, register_int_gauge};
use std::time::Instant;

/// Record the seconds elapsed since `start` into a gauge.
pub fn observe_elapsed(gauge: &Gauge, start: Instant) {
    gauge.set(start.elapsed().as_secs_f64());
}

lazy_static! {
    // ======== Ingestion Metrics ========

    /// Statuses whose text was extracted and logged by the listener
    pub static ref STATUSES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        "twitter_to_kafka_statuses_received_total",
        "Total number of statuses handled successfully by the status listener"
    ).unwrap();

    /// Statuses dropped because their text could not be extracted
    pub static ref LISTENER_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "twitter_to_kafka_listener_errors_total",
        "Total number of statuses dropped by the status listener"
    ).unwrap();

    /// Stream lines that were neither keep-alives nor valid statuses
    pub static ref STREAM_PARSE_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "twitter_to_kafka_stream_parse_errors_total",
        "Total number of undecodable lines received on the filtered stream"
    ).unwrap();

    /// Reconnect attempts made by the live stream delivery loop
    pub static ref STREAM_RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        "twitter_to_kafka_stream_reconnects_total",
        "Total number of filtered stream reconnect attempts"
    ).unwrap();

    /// Synthetic statuses produced by the mock runner
    pub static ref MOCK_STATUSES_GENERATED_TOTAL: IntCounter = register_int_counter!(
        "twitter_to_kafka_mock_statuses_generated_total",
        "Total number of statuses synthesised by the mock stream runner"
    ).unwrap();

    // ======== Lifecycle Metrics ========

    /// 1 while a runner holds an open stream handle, 0 otherwise
    pub static ref RUNNER_STREAMING: IntGauge = register_int_gauge!(
        "twitter_to_kafka_runner_streaming",
        "Whether the stream runner is currently streaming"
    ).unwrap();

    /// Time from the start of service bootstrap until the runner entered the streaming state
    pub static ref STARTUP_DURATION_SECONDS: Gauge = register_gauge!(
        "twitter_to_kafka_startup_duration_seconds",
        "Time from bootstrap until the stream runner started (seconds)"
    ).unwrap();
}
