// Local crates
use crate::{
    helpers::{
        load_config::Config,
        shutdown::{Shutdown, termination_signal},
    },
    listener::{
        listener::TwitterToKafkaListener,
        sink::{ObservabilitySink, TracingSink},
    },
    metrics::{
        http::start_metrics_server,
        metrics::{STARTUP_DURATION_SECONDS, observe_elapsed},
    },
    runner::select_runner,
    stream::{StreamClientFactory, twitter::TwitterStreamFactory},
};

// External crates
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Service entry point for `run`: load configuration, start streaming, and
/// park until SIGINT/SIGTERM.
pub async fn run_service(config_path: PathBuf) -> Result<()> {
    let cfg = Config::load(&config_path)?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        termination_signal().await;
        signal_shutdown.trigger();
    });

    let live_factory = Arc::new(TwitterStreamFactory::new(cfg.twitter.clone()));
    bootstrap(&cfg, live_factory, shutdown_rx).await
}

/// Wire the listener and runner for `cfg`, start the runner, and keep it
/// running until `shutdown_rx` fires.
///
/// A runner that fails to start is fatal: the error is logged and returned.
#[instrument(name = "service_bootstrap", target = "runtime::runtime", skip_all, level = "debug")]
pub async fn bootstrap(
    cfg: &Config,
    live_factory: Arc<dyn StreamClientFactory>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let started_at = Instant::now();

    info!("APP starts...");
    info!(keywords = ?cfg.keywords(), "{:?}", cfg.keywords());

    let metrics_cancel = CancellationToken::new();
    if cfg.metrics.enabled {
        let addr = cfg.metrics.listen_addr.clone();
        let cancel = metrics_cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&addr, cancel).await {
                error!(error = %e, metrics_addr = %addr, "Metrics server failed");
            }
        });
    }

    let listener_sink: Arc<dyn ObservabilitySink> =
        Arc::new(TracingSink::new("twitter_to_kafka_listener"));
    let runner_sink: Arc<dyn ObservabilitySink> = Arc::new(TracingSink::new("stream_runner"));

    let listener = Arc::new(TwitterToKafkaListener::new(listener_sink));
    let runner = select_runner(cfg, listener, runner_sink, live_factory);

    info!(runner = runner.name(), "Starting stream runner");
    // Rule sync can take several request timeouts; a signal must not wait for it.
    let started = tokio::select! {
        res = runner.start() => Some(res),
        _ = shutdown_rx.recv() => None,
    };

    match started {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            error!(error = %e, runner = runner.name(), "Stream runner failed to start");
            metrics_cancel.cancel();
            return Err(e).context("Failed to start stream runner");
        }
        None => {
            info!(runner = runner.name(), "Shutdown requested while stream runner was starting");
            runner.shutdown().await;
            metrics_cancel.cancel();
            return Ok(());
        }
    }
    observe_elapsed(&STARTUP_DURATION_SECONDS, started_at);

    Shutdown::wait_for_shutdown(shutdown_rx).await;

    info!(runner = runner.name(), "Shutting down stream runner");
    runner.shutdown().await;
    metrics_cancel.cancel();

    info!("Service shutdown complete");
    Ok(())
}
