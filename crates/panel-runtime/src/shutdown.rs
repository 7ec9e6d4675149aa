//! Graceful shutdown with signal handling

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Shutdown signal shared by the accept loop, open connections and
/// background tasks
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown is triggered
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for a background task; cancelling it does not shut the server down
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown signal triggered");
        }
        self.token.cancel();
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is triggered
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}

/// Signal handler for OS signals
#[derive(Debug)]
pub struct SignalHandler {
    signal: ShutdownSignal,
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new(signal: ShutdownSignal) -> Self {
        Self { signal }
    }

    /// Wait for SIGINT or SIGTERM (Ctrl+C elsewhere) and trigger shutdown
    pub async fn run(self) {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                        _ = sigint.recv() => tracing::info!("Received SIGINT"),
                        _ = self.signal.triggered() => return,
                    }
                    self.signal.trigger();
                    return;
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                }
            }
        }

        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C");
                    self.signal.trigger();
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to listen for Ctrl+C");
                }
            },
            _ = self.signal.triggered() => {}
        }
    }
}
