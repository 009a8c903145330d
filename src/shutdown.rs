//! Graceful shutdown handling.
//!
//! Listens for SIGTERM and SIGINT and fans the shutdown signal out to
//! every subsystem over a watch channel.

use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

/// Shutdown coordinator.
pub struct ShutdownHandler {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownHandler {
    /// Create a new shutdown handler.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Get a receiver for shutdown signals.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Trigger a shutdown.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT).
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }

        self.trigger();
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Run shutdown work with an upper bound. In-flight deliveries get
/// `deadline` to drain before the process gives up on them.
pub async fn graceful_shutdown<F, Fut>(deadline: Duration, shutdown_fn: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    match timeout(deadline, shutdown_fn()).await {
        Ok(()) => {
            info!("Graceful shutdown completed");
        }
        Err(_) => {
            warn!("Graceful shutdown timed out after {:?}", deadline);
        }
    }
}
