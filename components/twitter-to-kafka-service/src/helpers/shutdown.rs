// External crates
use tokio::sync::broadcast;
use tracing::instrument;

/// Process-wide shutdown notifier, built on-top of a broadcast channel.
///
/// - The signal listener task holds a clone and calls `.trigger()` on SIGINT/SIGTERM.
/// - The bootstrap parks on `.wait_for_shutdown()` while the stream runner works.
/// - Any other long running task may `.subscribe()` for its own receiver.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Creates a new shutdown broadcast channel.
    /// A small buffer size is sufficient since only one message is sent.
    #[instrument(name = "shutdown_channel", target = "helpers::shutdown", level = "trace")]
    pub fn new() -> Self {
        tracing::trace!("Creating new global shutdown channel");
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    /// Returns a new receiver for a long running task.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber and waiter that the process is stopping.
    #[instrument(name = "shutdown_trigger", target = "helpers::shutdown", level = "trace")]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered, notifying shutdown channel subscribers");
        let _ = self.tx.send(());
    }

    /// Park until `.trigger()` is called.
    ///
    /// Takes a receiver obtained from `.subscribe()` so callers can subscribe
    /// before the signal task exists; a trigger sent before subscribing is not seen.
    #[instrument(name = "shutdown_waiter", target = "helpers::shutdown", level = "trace", skip_all)]
    pub async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
        tracing::trace!("Waiting for shutdown signal");
        let _ = rx.recv().await;
        tracing::trace!("Shutdown signal received");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C signal detected"),
        _ = terminate => tracing::info!("SIGTERM signal detected"),
    }
}
