//! Graceful shutdown on SIGTERM/SIGINT (Ctrl+C elsewhere).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

/// Cloneable handle for triggering or awaiting shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once shutdown is triggered.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // Only fails if every sender is gone, and we hold one.
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Spawns a task that triggers shutdown on SIGTERM or SIGINT.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = handle.wait() => {
                    debug!("signal listener stopped");
                    return;
                }
            }
            handle.trigger();
        });
    }

    /// Spawns a task that triggers shutdown on Ctrl+C.
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("received Ctrl+C, shutting down");
                        handle.trigger();
                    }
                    Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
                },
                _ = handle.wait() => debug!("signal listener stopped"),
            }
        });
    }
}
