// Local crates
use crate::{
    helpers::errors::ServiceError,
    listener::{listener::StatusHandler, sink::ObservabilitySink},
    metrics::metrics::RUNNER_STREAMING,
    runner::{RunnerState, StreamRunner},
    stream::{FilterQuery, StreamClient, StreamClientFactory},
};

// External crates
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Runner state, holding the open handle while streaming.
#[derive(Debug)]
enum Lifecycle {
    Unstarted,
    Streaming(Box<dyn StreamClient>),
    Stopped,
}

impl Lifecycle {
    fn as_state(&self) -> RunnerState {
        match self {
            Self::Unstarted => RunnerState::Unstarted,
            Self::Streaming(_) => RunnerState::Streaming,
            Self::Stopped => RunnerState::Stopped,
        }
    }
}

/// Live runner: opens a filtered stream for the configured keywords and
/// registers the status listener on it.
///
/// The state mutex serialises `start()` and `shutdown()`, so a termination
/// signal racing startup either sees no handle or a fully filtered one.
#[derive(Debug)]
pub struct TwitterKafkaStreamRunner {
    keywords: Vec<String>,
    listener: Arc<dyn StatusHandler>,
    factory: Arc<dyn StreamClientFactory>,
    sink: Arc<dyn ObservabilitySink>,
    state: Mutex<Lifecycle>,
}

impl TwitterKafkaStreamRunner {
    pub fn new(
        keywords: Vec<String>,
        listener: Arc<dyn StatusHandler>,
        factory: Arc<dyn StreamClientFactory>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            keywords,
            listener,
            factory,
            sink,
            state: Mutex::new(Lifecycle::Unstarted),
        }
    }
}

#[async_trait]
impl StreamRunner for TwitterKafkaStreamRunner {
    #[instrument(name = "stream_runner::start", target = "runner::runner", skip_all, level = "debug")]
    async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if matches!(*state, Lifecycle::Streaming(_)) {
            return Err(ServiceError::AlreadyStreaming);
        }

        let mut client = self.factory.create()?;
        client.add_listener(self.listener.clone());

        let query = FilterQuery::new(&self.keywords);
        if let Err(e) = client.filter(query).await {
            // Don't leave a half-open session behind.
            if let Err(close) = client.shutdown().await {
                self.sink
                    .error(&format!("Failed to close stream after filter error: {close}"));
            }
            return Err(match e {
                ServiceError::StreamConnection(_) => e,
                other => ServiceError::StreamConnection(other.to_string()),
            });
        }

        self.sink.info(&format!(
            "Started filtering twitter stream for keywords {:?}",
            self.keywords
        ));

        *state = Lifecycle::Streaming(client);
        RUNNER_STREAMING.set(1);
        Ok(())
    }

    #[instrument(name = "stream_runner::shutdown", target = "runner::runner", skip_all, level = "debug")]
    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, Lifecycle::Streaming(_)) {
            return;
        }

        if let Lifecycle::Streaming(mut client) = std::mem::replace(&mut *state, Lifecycle::Stopped) {
            self.sink.info("Closing twitter stream!");
            if let Err(e) = client.shutdown().await {
                self.sink.error(&ServiceError::Shutdown(e.to_string()).to_string());
            }
            RUNNER_STREAMING.set(0);
        }
    }

    async fn state(&self) -> RunnerState {
        self.state.lock().await.as_state()
    }

    fn name(&self) -> &'static str {
        "twitter"
    }
}
