//! Streaming client seam.
//!
//! A `StreamClientFactory` opens a `StreamClient` handle; the handle accepts
//! status listeners, a keyword `FilterQuery`, and a shutdown request. Runners
//! only ever talk to these traits, the live Twitter implementation lives in
//! `twitter`.

pub mod models;
pub mod twitter;

// Local crates
use crate::{
    helpers::errors::ServiceError,
    listener::{listener::StatusHandler, models::Status},
};

// External crates
use async_trait::async_trait;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Ordered keyword terms restricting which statuses are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    keywords: Vec<String>,
}

impl FilterQuery {
    /// Build a query from `keywords`, preserving their order.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Keyword terms in submission order.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// An open session with a streaming service.
#[async_trait]
pub trait StreamClient: Send + Sync + Debug {
    /// Register a listener for every status delivered on this session.
    fn add_listener(&mut self, listener: Arc<dyn StatusHandler>);

    /// Submit `query` and begin delivering matching statuses to the listeners.
    async fn filter(&mut self, query: FilterQuery) -> Result<(), ServiceError>;

    /// Close the session. Calling it again after success is a no-op.
    async fn shutdown(&mut self) -> Result<(), ServiceError>;
}

/// Opens new `StreamClient` sessions.
pub trait StreamClientFactory: Send + Sync + Debug {
    /// Construct a fresh, unfiltered session.
    fn create(&self) -> Result<Box<dyn StreamClient>, ServiceError>;
}

/// Hand `status` to every listener, containing any panic raised by one of them.
///
/// Containment needs an unwinding build; the release profile aborts on panic.
pub fn deliver(listeners: &[Arc<dyn StatusHandler>], status: &Status) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.on_status(status))).is_err() {
            tracing::error!(
                status_id = status.id.as_deref().unwrap_or("unknown"),
                "Status listener panicked, dropping status"
            );
        }
    }
}
