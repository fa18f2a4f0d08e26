//! Service error taxonomy.
//!
//! `ServiceError` covers everything that can go wrong while the service boots,
//! starts streaming, or tears the stream down. Listener failures are kept apart
//! in `ListenerError` since they are always recovered inside the listener and
//! never reach the runner or the bootstrap.

/// Errors surfaced by configuration loading and the stream runners.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration missing, malformed or semantically invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The streaming client could not be created or the filter could not be submitted.
    #[error("stream connection error: {0}")]
    StreamConnection(String),

    /// `start()` was called while a stream handle is already open.
    #[error("stream runner is already streaming")]
    AlreadyStreaming,

    /// Closing the stream handle failed. Only ever logged.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Failure to extract or log the text of a single status.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The status carried no text field.
    #[error("status {id} has no text")]
    MissingText {
        /// Status id, or `unknown` when the payload had none.
        id: String,
    },
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        Self::StreamConnection(e.to_string())
    }
}
