// Local crates
use crate::{
    listener::{models::Status, sink::ObservabilitySink},
    metrics::metrics::{LISTENER_ERRORS_TOTAL, STATUSES_RECEIVED_TOTAL},
};

// External crates
use std::fmt::Debug;
use std::sync::Arc;

/// Capability registered with a streaming client: called once per inbound status.
///
/// Implementations are invoked from the client's delivery task, possibly from
/// several worker threads at once, and must not let a failure escape.
pub trait StatusHandler: Send + Sync + Debug {
    /// Handle one status. Fire-and-forget from the caller's point of view.
    fn on_status(&self, status: &Status);
}

/// Logs the text of every status it receives.
///
/// This is where the Kafka publish call will go once the producer exists; for
/// now the log line is the only output.
#[derive(Debug, Clone)]
pub struct TwitterToKafkaListener {
    sink: Arc<dyn ObservabilitySink>,
}

impl TwitterToKafkaListener {
    /// Create a listener writing to `sink`.
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { sink }
    }
}

impl StatusHandler for TwitterToKafkaListener {
    fn on_status(&self, status: &Status) {
        match status.text() {
            Ok(text) => {
                self.sink.info(&format!("Twitter status with text {text}"));
                STATUSES_RECEIVED_TOTAL.inc();
            }
            Err(e) => {
                self.sink.error(&format!("Dropping status, failed to extract text: {e}"));
                LISTENER_ERRORS_TOTAL.inc();
            }
        }
    }
}
