// External crates
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt,
    prelude::*,
    registry::Registry,
};

/// Directory for the JSON log file. When unset only the stdout layer is installed.
pub const LOG_DIR_ENV: &str = "TWITTER_TO_KAFKA_LOG_DIR";

/// Install the global subscriber.
///
/// - stdout: human readable, filtered by `RUST_LOG` (default `info`)
/// - file: JSON lines, rolled daily, when `TWITTER_TO_KAFKA_LOG_DIR` is set
///
/// The returned guard flushes the file writer on drop and must outlive the runtime.
pub fn init_tracing() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = env_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok());

    let stdout_layer = fmt::layer()
        .with_ansi(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (json_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let file_appender = rolling::daily(dir, "twitter_to_kafka_service.log");
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_writer)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_timer(fmt::time::UtcTime::rfc_3339());

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(json_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

/// `RUST_LOG` directives when present and valid, `info` otherwise.
fn env_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Route panics through `tracing` so they land in the same sinks as everything else.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Unknown panic");

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
    }));
}
