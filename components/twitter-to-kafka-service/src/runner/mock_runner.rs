// Local crates
use crate::{
    helpers::{errors::ServiceError, load_config::ServiceConfig},
    listener::{listener::StatusHandler, models::Status, sink::ObservabilitySink},
    metrics::metrics::{MOCK_STATUSES_GENERATED_TOTAL, RUNNER_STREAMING},
    runner::{RunnerState, StreamRunner},
    stream::deliver,
};

// External crates
use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const WORDS: &[&str] = &[
    "Lorem", "ipsum", "dolor", "sit", "amet", "consectetuer", "adipiscing", "elit", "Maecenas",
    "porttitor", "congue", "massa", "Fusce", "posuere", "magna", "sed", "pulvinar", "ultricies",
    "purus", "lectus", "malesuada", "libero",
];

#[derive(Debug)]
enum Lifecycle {
    Unstarted,
    Streaming {
        cancel: CancellationToken,
        worker: JoinHandle<()>,
    },
    Stopped,
}

/// Runner used when `enable_mock_tweets` is set: no network, statuses are
/// synthesised from filler words plus one of the configured keywords.
#[derive(Debug)]
pub struct MockKafkaStreamRunner {
    keywords: Arc<Vec<String>>,
    min_length: usize,
    max_length: usize,
    interval: Duration,
    listener: Arc<dyn StatusHandler>,
    sink: Arc<dyn ObservabilitySink>,
    state: Mutex<Lifecycle>,
}

impl MockKafkaStreamRunner {
    pub fn new(
        config: &ServiceConfig,
        listener: Arc<dyn StatusHandler>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            keywords: Arc::new(config.twitter_keywords.clone()),
            min_length: config.mock_min_tweet_length,
            max_length: config.mock_max_tweet_length,
            interval: config.mock_sleep(),
            listener,
            sink,
            state: Mutex::new(Lifecycle::Unstarted),
        }
    }
}

#[async_trait]
impl StreamRunner for MockKafkaStreamRunner {
    #[instrument(name = "mock_stream_runner::start", target = "runner::mock_runner", skip_all, level = "debug")]
    async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if matches!(*state, Lifecycle::Streaming { .. }) {
            return Err(ServiceError::AlreadyStreaming);
        }

        let cancel = CancellationToken::new();
        let generator = MockGenerator {
            keywords: self.keywords.clone(),
            min_length: self.min_length,
            max_length: self.max_length,
        };
        let worker = tokio::spawn(run_mock_stream(
            generator,
            self.interval,
            vec![self.listener.clone()],
            cancel.clone(),
        ));

        self.sink.info(&format!(
            "Started mock twitter stream for keywords {:?}",
            self.keywords
        ));

        *state = Lifecycle::Streaming { cancel, worker };
        RUNNER_STREAMING.set(1);
        Ok(())
    }

    #[instrument(name = "mock_stream_runner::shutdown", target = "runner::mock_runner", skip_all, level = "debug")]
    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, Lifecycle::Streaming { .. }) {
            return;
        }

        if let Lifecycle::Streaming { cancel, worker } =
            std::mem::replace(&mut *state, Lifecycle::Stopped)
        {
            self.sink.info("Closing mock twitter stream!");
            cancel.cancel();
            if let Err(e) = worker.await {
                self.sink
                    .error(&ServiceError::Shutdown(format!("mock stream task failed: {e}")).to_string());
            }
            RUNNER_STREAMING.set(0);
        }
    }

    async fn state(&self) -> RunnerState {
        match *self.state.lock().await {
            Lifecycle::Unstarted => RunnerState::Unstarted,
            Lifecycle::Streaming { .. } => RunnerState::Streaming,
            Lifecycle::Stopped => RunnerState::Stopped,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone)]
struct MockGenerator {
    keywords: Arc<Vec<String>>,
    min_length: usize,
    max_length: usize,
}

impl MockGenerator {
    /// Text of `min_length..=max_length` words, exactly one of which is a keyword.
    fn text<R: Rng>(&self, rng: &mut R) -> String {
        let length = rng.random_range(self.min_length..=self.max_length).max(1);
        let mut words: Vec<&str> = (0..length - 1)
            .filter_map(|_| WORDS.choose(&mut *rng).copied())
            .collect();

        if let Some(keyword) = self.keywords.choose(&mut *rng) {
            let at = rng.random_range(0..=words.len());
            words.insert(at, keyword.as_str());
        }

        words.join(" ")
    }

    fn status<R: Rng>(&self, sequence: u64, rng: &mut R) -> Status {
        let text = self.text(rng);
        Status {
            author_id: Some(rng.random_range(1_000u64..1_000_000).to_string()),
            created_at: Some(Utc::now()),
            ..Status::new(sequence.to_string(), text)
        }
    }
}

async fn run_mock_stream(
    generator: MockGenerator,
    interval: Duration,
    listeners: Vec<Arc<dyn StatusHandler>>,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::from_os_rng();
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        sequence += 1;
        let status = generator.status(sequence, &mut rng);
        MOCK_STATUSES_GENERATED_TOTAL.inc();
        deliver(&listeners, &status);
    }

    tracing::debug!(generated = sequence, "Mock twitter stream stopped");
}
