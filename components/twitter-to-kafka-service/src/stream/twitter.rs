//! Twitter API v2 filtered stream client.
//!
//! `filter()` syncs the account's stream rules with the keyword query (one rule
//! per keyword) and then spawns the delivery loop, which holds the long lived
//! `GET /2/tweets/search/stream` connection open and hands every decoded status
//! to the registered listeners. The loop reconnects on its own with the backoff
//! Twitter documents: linear steps of one second up to a minute, then doubling
//! up to sixteen minutes.

// Local crates
use crate::{
    helpers::{errors::ServiceError, load_config::TwitterConfig},
    listener::listener::StatusHandler,
    metrics::metrics::{STREAM_PARSE_ERRORS_TOTAL, STREAM_RECONNECTS_TOTAL},
    stream::{
        FilterQuery, StreamClient, StreamClientFactory, deliver,
        models::{
            AddRulesRequest, DeleteIds, DeleteRulesRequest, RulesResponse, StreamLine, StreamRule,
        },
    },
};

// External crates
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const RULES_PATH: &str = "/2/tweets/search/stream/rules";
const STREAM_PATH: &str = "/2/tweets/search/stream?tweet.fields=id,text,author_id,created_at";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const LINEAR_BACKOFF_THRESHOLD: Duration = Duration::from_secs(60);
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 16);

/// Longest partial line kept while waiting for its newline.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Opens `TwitterStream` sessions from the `[twitter]` configuration.
#[derive(Debug, Clone)]
pub struct TwitterStreamFactory {
    config: TwitterConfig,
}

impl TwitterStreamFactory {
    pub fn new(config: TwitterConfig) -> Self {
        Self { config }
    }
}

impl StreamClientFactory for TwitterStreamFactory {
    fn create(&self) -> Result<Box<dyn StreamClient>, ServiceError> {
        Ok(Box::new(TwitterStream::new(&self.config)?))
    }
}

/// One filtered stream session.
#[derive(Debug)]
pub struct TwitterStream {
    rules_http: Client,
    stream_http: Client,
    base_url: String,
    bearer_token: String,
    replace_existing_rules: bool,
    listeners: Vec<Arc<dyn StatusHandler>>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl TwitterStream {
    /// Build the HTTP clients for a session. Nothing is sent until `filter()`.
    pub fn new(config: &TwitterConfig) -> Result<Self, ServiceError> {
        let bearer_token = config
            .bearer_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::StreamConnection("bearer token required for filtered stream".into())
            })?;

        let user_agent = format!("twitter-to-kafka-service/{}", env!("CARGO_PKG_VERSION"));

        let rules_http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(user_agent.clone())
            .build()?;

        // No total timeout on the stream connection; an idle read timeout
        // catches a silently dead connection instead.
        let stream_http = Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .read_timeout(Duration::from_secs(config.stream_idle_timeout_secs))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            rules_http,
            stream_http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bearer_token,
            replace_existing_rules: config.replace_existing_rules,
            listeners: Vec::new(),
            cancel: CancellationToken::new(),
            worker: None,
        })
    }

    async fn rules_request<B: Serialize>(
        &self,
        body: Option<&B>,
    ) -> Result<RulesResponse, ServiceError> {
        let url = format!("{}{}", self.base_url, RULES_PATH);

        let mut req = match body {
            Some(b) => self.rules_http.post(&url).json(b),
            None => self.rules_http.get(&url),
        };
        req = req.bearer_auth(&self.bearer_token);

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::StreamConnection(format!(
                "stream rules request failed with {status}: {body}"
            )));
        }

        let rules: RulesResponse = response.json().await?;
        if let Some(errors) = rules.errors.as_ref().filter(|e| !e.is_empty()) {
            warn!(errors = ?errors, "Twitter reported errors for stream rules request");
        }
        Ok(rules)
    }

    /// Make the account's rule set match `query`.
    #[instrument(name = "twitter_stream::sync_rules", target = "stream::twitter", skip_all, level = "debug")]
    async fn sync_rules(&self, query: &FilterQuery) -> Result<(), ServiceError> {
        if self.replace_existing_rules {
            let existing = self.rules_request(None::<&()>).await?;
            let ids: Vec<String> = existing
                .data
                .unwrap_or_default()
                .into_iter()
                .filter_map(|r| r.id)
                .collect();

            if !ids.is_empty() {
                debug!(rule_count = ids.len(), "Deleting existing stream rules");
                self.rules_request(Some(&DeleteRulesRequest {
                    delete: DeleteIds { ids },
                }))
                .await?;
            }
        }

        let add = AddRulesRequest {
            add: query
                .keywords()
                .iter()
                .map(|k| StreamRule::for_keyword(k))
                .collect(),
        };
        let created = self.rules_request(Some(&add)).await?;

        debug!(
            created_rules = created.data.map(|d| d.len()).unwrap_or_default(),
            "Stream rules submitted"
        );
        Ok(())
    }

    fn stop_worker(&mut self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.worker.take()
    }
}

#[async_trait]
impl StreamClient for TwitterStream {
    fn add_listener(&mut self, listener: Arc<dyn StatusHandler>) {
        self.listeners.push(listener);
    }

    async fn filter(&mut self, query: FilterQuery) -> Result<(), ServiceError> {
        if query.is_empty() {
            return Err(ServiceError::StreamConnection(
                "filter query must contain at least one keyword".into(),
            ));
        }

        // Re-filtering replaces the running delivery loop.
        if let Some(previous) = self.stop_worker() {
            let _ = previous.await;
        }
        self.cancel = CancellationToken::new();

        self.sync_rules(&query).await?;

        let ctx = StreamLoop {
            http: self.stream_http.clone(),
            url: format!("{}{}", self.base_url, STREAM_PATH),
            bearer_token: self.bearer_token.clone(),
            listeners: self.listeners.clone(),
            cancel: self.cancel.clone(),
        };
        self.worker = Some(tokio::spawn(ctx.run()));

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ServiceError> {
        match self.stop_worker() {
            Some(worker) => match worker.await {
                Err(e) if e.is_panic() => Err(ServiceError::Shutdown(format!(
                    "stream delivery task panicked: {e}"
                ))),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for TwitterStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the delivery loop task owns.
struct StreamLoop {
    http: Client,
    url: String,
    bearer_token: String,
    listeners: Vec<Arc<dyn StatusHandler>>,
    cancel: CancellationToken,
}

impl StreamLoop {
    #[instrument(name = "twitter_stream::delivery_loop", target = "stream::twitter", skip_all, level = "debug")]
    async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!(url = %self.url, "Connecting to Twitter filtered stream");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = self.connect() => res,
            };

            match connected {
                Ok(response) => {
                    backoff = INITIAL_BACKOFF;
                    info!("Connected to Twitter filtered stream");

                    let processed = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        res = process_stream(response, &self.listeners) => res,
                    };

                    match processed {
                        Ok(()) => warn!("Twitter closed the filtered stream"),
                        Err(e) => warn!(error = %e, "Filtered stream processing error"),
                    }
                }
                Err(e) => error!(error = %e, "Failed to connect to filtered stream"),
            }

            STREAM_RECONNECTS_TOTAL.inc();
            info!(delay_secs = backoff.as_secs(), "Reconnecting after delay");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff);
        }

        debug!("Filtered stream delivery loop exited");
    }

    async fn connect(&self) -> Result<Response, ServiceError> {
        let response = self
            .http
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::StreamConnection(format!(
                "filtered stream returned {status}: {body}"
            )));
        }

        Ok(response)
    }
}

/// Read the newline delimited body until it ends, delivering each status.
async fn process_stream(
    response: Response,
    listeners: &[Arc<dyn StatusHandler>],
) -> Result<(), ServiceError> {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk: Bytes = chunk?;
        buffer.extend_from_slice(&chunk);

        while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
            handle_line(&String::from_utf8_lossy(&line), listeners);
        }

        if buffer.len() > MAX_LINE_BYTES {
            STREAM_PARSE_ERRORS_TOTAL.inc();
            return Err(ServiceError::StreamConnection(format!(
                "stream line exceeded {MAX_LINE_BYTES} bytes without a newline"
            )));
        }
    }

    // Body ended without a trailing newline.
    if !buffer.is_empty() {
        handle_line(&String::from_utf8_lossy(&buffer), listeners);
    }

    Ok(())
}

fn handle_line(line: &str, listeners: &[Arc<dyn StatusHandler>]) {
    match StreamLine::decode(line) {
        StreamLine::KeepAlive => debug!("Received keep-alive"),
        StreamLine::Status(envelope) => {
            debug!(
                status_id = envelope.data.id.as_deref().unwrap_or("unknown"),
                matching_tags = ?envelope
                    .matching_rules
                    .iter()
                    .filter_map(|r| r.tag.as_deref())
                    .collect::<Vec<_>>(),
                "Received stream status"
            );
            deliver(listeners, &envelope.data);
        }
        StreamLine::ApiError(msg) => {
            STREAM_PARSE_ERRORS_TOTAL.inc();
            error!(error = %msg, "Twitter sent an error on the filtered stream");
        }
        StreamLine::Malformed(e) => {
            STREAM_PARSE_ERRORS_TOTAL.inc();
            warn!(error = %e, data = %line.trim(), "Failed to parse stream data");
        }
    }
}

/// Linear +1s steps up to a minute, then doubling, capped at sixteen minutes.
fn next_backoff(current: Duration) -> Duration {
    if current < LINEAR_BACKOFF_THRESHOLD {
        current + Duration::from_secs(1)
    } else {
        std::cmp::min(current * 2, MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{listener::TwitterToKafkaListener, sink::testing::RecordingSink};
    use wiremock::{
        Mock, MockServer, Request, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    fn test_config(server: &MockServer) -> TwitterConfig {
        TwitterConfig {
            api_url: server.uri(),
            bearer_token: Some("test_bearer_token".into()),
            request_timeout_secs: 5,
            stream_idle_timeout_secs: 5,
            replace_existing_rules: true,
        }
    }

    async fn mount_empty_rules(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"result_count": 0}
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn factory_requires_bearer_token() {
        let factory = TwitterStreamFactory::new(TwitterConfig::default());
        let err = factory.create().unwrap_err();
        assert!(matches!(err, ServiceError::StreamConnection(_)));
    }

    #[test]
    fn backoff_is_linear_then_exponential_and_capped() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(59)), Duration::from_secs(60));
        assert_eq!(next_backoff(Duration::from_secs(60)), Duration::from_secs(120));
        assert_eq!(next_backoff(Duration::from_secs(600)), MAX_BACKOFF);
        assert_eq!(next_backoff(MAX_BACKOFF), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn filter_adds_one_rule_per_keyword_in_order() {
        let server = MockServer::start().await;
        mount_empty_rules(&server).await;

        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .and(header("authorization", "Bearer test_bearer_token"))
            .and(body_json(serde_json::json!({
                "add": [
                    {"value": "kafka", "tag": "kafka"},
                    {"value": "microservice", "tag": "microservice"}
                ]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": [
                    {"id": "1", "value": "kafka", "tag": "kafka"},
                    {"id": "2", "value": "microservice", "tag": "microservice"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\r\n"))
            .mount(&server)
            .await;

        let mut stream = TwitterStream::new(&test_config(&server)).unwrap();
        stream
            .filter(FilterQuery::new(["kafka", "microservice"]))
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn filter_deletes_stale_rules_first() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "77", "value": "old", "tag": "old"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .and(body_json(serde_json::json!({"delete": {"ids": ["77"]}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"summary": {"deleted": 1}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .and(|req: &Request| {
                serde_json::from_slice::<serde_json::Value>(&req.body)
                    .map(|v| v.get("add").is_some())
                    .unwrap_or(false)
            })
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\r\n"))
            .mount(&server)
            .await;

        let mut stream = TwitterStream::new(&test_config(&server)).unwrap();
        stream.filter(FilterQuery::new(["kafka"])).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_rules_surface_as_connection_error() {
        let server = MockServer::start().await;
        mount_empty_rules(&server).await;

        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("client-not-enrolled"))
            .mount(&server)
            .await;

        let mut stream = TwitterStream::new(&test_config(&server)).unwrap();
        let err = stream.filter(FilterQuery::new(["kafka"])).await.unwrap_err();

        match err {
            ServiceError::StreamConnection(msg) => assert!(msg.contains("403")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn delivers_stream_statuses_to_listeners() {
        let server = MockServer::start().await;
        mount_empty_rules(&server).await;

        Mock::given(method("POST"))
            .and(path(RULES_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let body = concat!(
            "{\"data\":{\"id\":\"1\",\"text\":\"kafka streams\"},\"matching_rules\":[{\"id\":\"1\",\"tag\":\"kafka\"}]}\r\n",
            "\r\n",
            "garbage\r\n",
            "{\"data\":{\"id\":\"2\",\"text\":\"microservice mesh\"}}\r\n",
        );
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let mut stream = TwitterStream::new(&test_config(&server)).unwrap();
        stream.add_listener(Arc::new(TwitterToKafkaListener::new(sink.clone())));
        stream.filter(FilterQuery::new(["kafka", "microservice"])).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while sink.infos().len() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        stream.shutdown().await.unwrap();

        let infos = sink.infos();
        assert_eq!(infos[0], "Twitter status with text kafka streams");
        assert_eq!(infos[1], "Twitter status with text microservice mesh");
    }

    #[tokio::test]
    async fn unterminated_oversized_line_aborts_the_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/tweets/search/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(MAX_LINE_BYTES + 1)))
            .mount(&server)
            .await;

        let response = reqwest::get(format!("{}{}", server.uri(), STREAM_PATH))
            .await
            .unwrap();
        let err = process_stream(response, &[]).await.unwrap_err();

        match err {
            ServiceError::StreamConnection(msg) => assert!(msg.contains("without a newline")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_without_filter_is_a_no_op() {
        let server = MockServer::start().await;
        let mut stream = TwitterStream::new(&test_config(&server)).unwrap();

        stream.shutdown().await.unwrap();
        stream.shutdown().await.unwrap();

        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
