//! twitter-to-kafka-service: streams keyword filtered Twitter statuses and
//! logs them, ahead of forwarding them to Kafka.

mod cli;
mod helpers;
mod instrumentation;
mod listener;
mod metrics;
mod runner;
mod runtime;
mod stream;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the file writer guard alive until the process exits.
    let _log_guard = instrumentation::tracing::init_tracing()?;
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    cli::cli::run().await
}
