//! Observability sink handed to components at construction.
//!
//! Components that report per-event outcomes (the status listener, the
//! runners) write through an `ObservabilitySink` instead of calling the global
//! `tracing` macros directly. Production wiring uses `TracingSink`; tests swap
//! in a recording sink to assert on exactly what was emitted.

use std::fmt::Debug;

/// Line-oriented info/error sink.
pub trait ObservabilitySink: Send + Sync + Debug {
    /// Emit an informational line.
    fn info(&self, message: &str);
    /// Emit an error line.
    fn error(&self, message: &str);
}

/// Sink forwarding to the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    component: &'static str,
}

impl TracingSink {
    /// `component` is attached to every emitted event as a field.
    #[must_use]
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }
}

impl ObservabilitySink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(component = self.component, "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(component = self.component, "{message}");
    }
}
