pub mod mock_runner;
pub mod runner;

// Local crates
use crate::{
    helpers::{errors::ServiceError, load_config::Config},
    listener::{listener::StatusHandler, sink::ObservabilitySink},
    runner::{mock_runner::MockKafkaStreamRunner, runner::TwitterKafkaStreamRunner},
    stream::StreamClientFactory,
};

// External crates
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Lifecycle of a stream runner.
///
/// `start()` moves `Unstarted`/`Stopped` to `Streaming`; `shutdown()` moves
/// `Streaming` to `Stopped` and leaves the other states untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Unstarted,
    Streaming,
    Stopped,
}

/// Owns the lifecycle of one status source.
#[async_trait]
pub trait StreamRunner: Send + Sync + Debug {
    /// Open the source and begin delivering statuses to the listener.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Close the source if open. Best effort, never fails.
    async fn shutdown(&self);

    /// Current lifecycle state.
    async fn state(&self) -> RunnerState;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Pick the runner once at startup: the mock runner when
/// `enable_mock_tweets` is set, otherwise the live runner over `live_factory`.
pub fn select_runner(
    config: &Config,
    listener: Arc<dyn StatusHandler>,
    sink: Arc<dyn ObservabilitySink>,
    live_factory: Arc<dyn StreamClientFactory>,
) -> Arc<dyn StreamRunner> {
    if config.mock_enabled() {
        Arc::new(MockKafkaStreamRunner::new(
            &config.twitter_to_kafka_service,
            listener,
            sink,
        ))
    } else {
        Arc::new(TwitterKafkaStreamRunner::new(
            config.keywords().to_vec(),
            listener,
            live_factory,
            sink,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::load_config::{MetricsConfig, ServiceConfig, TwitterConfig};
    use crate::listener::sink::testing::RecordingSink;
    use crate::stream::testing::FakeStreamFactory;
    use crate::listener::listener::TwitterToKafkaListener;

    fn config(mock: bool) -> Config {
        Config {
            twitter_to_kafka_service: ServiceConfig {
                twitter_keywords: vec!["kafka".into(), "microservice".into()],
                enable_mock_tweets: mock,
                mock_min_tweet_length: 3,
                mock_max_tweet_length: 5,
                mock_sleep_ms: 5,
            },
            twitter: TwitterConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[tokio::test]
    async fn mock_flag_never_touches_the_live_client() {
        let sink = Arc::new(RecordingSink::default());
        let factory = Arc::new(FakeStreamFactory::default());
        let listener = Arc::new(TwitterToKafkaListener::new(sink.clone()));

        let runner = select_runner(&config(true), listener, sink, factory.clone());
        runner.start().await.unwrap();
        runner.shutdown().await;

        assert_eq!(runner.name(), "mock");
        assert_eq!(factory.recorder.created(), 0);
        assert!(factory.recorder.filters().is_empty());
    }

    #[tokio::test]
    async fn live_runner_is_selected_when_mock_is_disabled() {
        let sink = Arc::new(RecordingSink::default());
        let factory = Arc::new(FakeStreamFactory::default());
        let listener = Arc::new(TwitterToKafkaListener::new(sink.clone()));

        let runner = select_runner(&config(false), listener, sink, factory.clone());
        runner.start().await.unwrap();

        assert_eq!(runner.name(), "twitter");
        assert_eq!(runner.state().await, RunnerState::Streaming);
        assert_eq!(
            factory.recorder.filters()[0].keywords(),
            ["kafka", "microservice"]
        );
    }
}
