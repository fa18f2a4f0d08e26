// Local crates
use crate::helpers::errors::ServiceError;

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Prefix for environment variable overrides, e.g.
/// `TWITTER_TO_KAFKA__TWITTER__BEARER_TOKEN`.
pub const ENV_PREFIX: &str = "TWITTER_TO_KAFKA";

/// Top level service configuration. Loaded once at startup and never mutated.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Keyword filter and ingestion mode.
    pub twitter_to_kafka_service: ServiceConfig,
    /// Live Twitter API settings, only required when mock tweets are disabled.
    #[serde(default)]
    pub twitter: TwitterConfig,
    /// Prometheus endpoint settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load the configuration file, layer environment overrides on top and
    /// validate the result.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Config::load`], reading overrides from `env` instead of the
    /// process environment when it is `Some`.
    fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading service configuration file"
        );

        let layered = match config::Config::builder()
            .add_source(config::File::from(path_ref).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("twitter_to_kafka_service.twitter_keywords")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read configuration sources");
                return Err(e)
                    .with_context(|| format!("Failed to read config file at {:?}", path_ref));
            }
        };

        let cfg: Config = match layered.try_deserialize() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to deserialize configuration");
                return Err(e)
                    .with_context(|| format!("Failed to parse configuration from {:?}", path_ref));
            }
        };

        cfg.validate()
            .with_context(|| format!("Invalid configuration in {:?}", path_ref))?;

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Service configuration file loaded successfully"
        );
        Ok(cfg)
    }

    /// Ordered keyword list used verbatim to build the stream filter.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.twitter_to_kafka_service.twitter_keywords
    }

    /// Whether live ingestion is replaced by the mock runner.
    #[must_use]
    pub fn mock_enabled(&self) -> bool {
        self.twitter_to_kafka_service.enable_mock_tweets
    }

    fn validate(&self) -> Result<(), ServiceError> {
        let service = &self.twitter_to_kafka_service;

        if service.twitter_keywords.is_empty() {
            return Err(ServiceError::Configuration(
                "twitter_keywords must contain at least one keyword".into(),
            ));
        }
        if service.twitter_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ServiceError::Configuration(
                "twitter_keywords must not contain blank keywords".into(),
            ));
        }
        if service.mock_min_tweet_length == 0
            || service.mock_min_tweet_length > service.mock_max_tweet_length
        {
            return Err(ServiceError::Configuration(format!(
                "mock tweet length range {}..={} is invalid",
                service.mock_min_tweet_length, service.mock_max_tweet_length
            )));
        }

        if service.mock_sleep_ms == 0 {
            return Err(ServiceError::Configuration(
                "mock_sleep_ms must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub twitter_keywords: Vec<String>,
    #[serde(default)]
    pub enable_mock_tweets: bool,
    #[serde(default = "default_mock_min_tweet_length")]
    pub mock_min_tweet_length: usize,
    #[serde(default = "default_mock_max_tweet_length")]
    pub mock_max_tweet_length: usize,
    #[serde(default = "default_mock_sleep_ms")]
    pub mock_sleep_ms: u64,
}

impl ServiceConfig {
    /// Interval between two synthesised statuses.
    #[must_use]
    pub fn mock_sleep(&self) -> Duration {
        Duration::from_millis(self.mock_sleep_ms)
    }
}

fn default_mock_min_tweet_length() -> usize {
    5
}

fn default_mock_max_tweet_length() -> usize {
    15
}

fn default_mock_sleep_ms() -> u64 {
    1000
}

/// Twitter API v2 settings for the live filtered stream.
#[derive(Debug, Deserialize, Clone)]
pub struct TwitterConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Delete rules left over from earlier runs before adding ours.
    #[serde(default = "default_replace_existing_rules")]
    pub replace_existing_rules: bool,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            bearer_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            replace_existing_rules: default_replace_existing_rules(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stream_idle_timeout_secs() -> u64 {
    90
}

fn default_replace_existing_rules() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9000".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_keywords_in_order_with_defaults() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = ["kafka", "microservice", "elasticsearch"]
            "#,
        );

        let cfg = Config::load(file.path()).unwrap();

        assert_eq!(cfg.keywords(), ["kafka", "microservice", "elasticsearch"]);
        assert!(!cfg.mock_enabled());
        assert_eq!(cfg.twitter.api_url, "https://api.twitter.com");
        assert!(cfg.twitter.bearer_token.is_none());
        assert!(cfg.twitter.replace_existing_rules);
        assert!(!cfg.metrics.enabled);
        assert_eq!(cfg.twitter_to_kafka_service.mock_sleep(), Duration::from_secs(1));
    }

    #[test]
    fn reads_mock_and_twitter_sections() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = ["rust"]
            enable_mock_tweets = true
            mock_min_tweet_length = 2
            mock_max_tweet_length = 4
            mock_sleep_ms = 10

            [twitter]
            api_url = "http://localhost:8080"
            bearer_token = "token"
            replace_existing_rules = false

            [metrics]
            enabled = true
            listen_addr = "127.0.0.1:9100"
            "#,
        );

        let cfg = Config::load(file.path()).unwrap();

        assert!(cfg.mock_enabled());
        assert_eq!(cfg.twitter_to_kafka_service.mock_min_tweet_length, 2);
        assert_eq!(cfg.twitter_to_kafka_service.mock_max_tweet_length, 4);
        assert_eq!(cfg.twitter.bearer_token.as_deref(), Some("token"));
        assert!(!cfg.twitter.replace_existing_rules);
        assert_eq!(cfg.metrics.listen_addr, "127.0.0.1:9100");
    }

    #[test]
    fn rejects_empty_keyword_list() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = []
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        let root = err.downcast_ref::<ServiceError>();
        assert!(matches!(root, Some(ServiceError::Configuration(_))));
    }

    #[test]
    fn rejects_inverted_mock_length_range() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = ["kafka"]
            mock_min_tweet_length = 10
            mock_max_tweet_length = 3
            "#,
        );

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn missing_service_section_is_an_error() {
        let file = write_config(
            r#"
            [twitter]
            bearer_token = "token"
            "#,
        );

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_zero_mock_sleep() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = ["kafka"]
            mock_sleep_ms = 0
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Configuration(msg)) if msg.contains("mock_sleep_ms")
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = write_config(
            r#"
            [twitter_to_kafka_service]
            twitter_keywords = ["java"]

            [twitter]
            bearer_token = "from-file"
            "#,
        );
        let env: config::Map<String, String> = [
            ("TWITTER_TO_KAFKA__TWITTER__BEARER_TOKEN", "tok"),
            (
                "TWITTER_TO_KAFKA__TWITTER_TO_KAFKA_SERVICE__TWITTER_KEYWORDS",
                "kafka,microservice",
            ),
            ("TWITTER_TO_KAFKA__METRICS__ENABLED", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let cfg = Config::load_with_env(file.path(), Some(env)).unwrap();

        assert_eq!(cfg.twitter.bearer_token.as_deref(), Some("tok"));
        assert_eq!(cfg.keywords(), ["kafka", "microservice"]);
        assert!(cfg.metrics.enabled);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load("/definitely/not/here/service.toml").is_err());
    }
}
