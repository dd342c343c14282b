//! Graceful shutdown handling
//!
//! A cloneable signal shared by the WebSocket server, the connection tasks
//! and the pending-request sweeper.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shutdown signal that can be cloned and shared across tasks
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("Shutdown signal triggered");
            let _ = self.sender.send(());
        }
    }

    /// Future resolving once shutdown is triggered, including when it
    /// already was.
    pub fn notified(&self) -> ShutdownNotified {
        ShutdownNotified {
            receiver: self.sender.subscribe(),
            triggered: self.triggered.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownNotified {
    receiver: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownNotified {
    pub async fn wait(mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.receiver.recv().await;
    }
}

/// Trigger `shutdown` on SIGTERM or SIGINT.
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install unix signal handlers, falling back to Ctrl+C");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    shutdown.trigger();
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

/// Wait for `shutdown`, then give `cleanup` at most `timeout` to finish.
/// Returns `false` when the cleanup timed out.
pub async fn shutdown_with_cleanup<F, Fut>(shutdown: &ShutdownSignal, timeout: Duration, cleanup: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    shutdown.notified().wait().await;
    info!(timeout_secs = timeout.as_secs(), "Starting graceful shutdown");

    match tokio::time::timeout(timeout, cleanup()).await {
        Ok(()) => {
            info!("Graceful shutdown completed");
            true
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Graceful shutdown timed out");
            false
        }
    }
}
