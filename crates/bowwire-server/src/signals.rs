//! Shutdown signalling.
//!
//! [`Shutdown`] is a cloneable flag backed by a watch channel. The broker's
//! accept loop waits on it; [`listen_for_signals`] trips it on SIGINT or
//! SIGTERM (Ctrl+C elsewhere).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A cloneable shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Creates an untriggered flag.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Trips the flag. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true once the flag has been tripped.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when the flag is tripped.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Spawns a task that trips `shutdown` on SIGINT or SIGTERM.
#[cfg(unix)]
pub fn listen_for_signals(shutdown: Shutdown) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
            _ = shutdown.wait() => {
                debug!("Shutdown triggered elsewhere, signal listener stopping");
                return;
            }
        }
        shutdown.trigger();
    });
}

/// Spawns a task that trips `shutdown` on Ctrl+C.
#[cfg(not(unix))]
pub fn listen_for_signals(shutdown: Shutdown) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("Received Ctrl+C, initiating shutdown");
                    shutdown.trigger();
                }
            }
            _ = shutdown.wait() => debug!("Shutdown triggered elsewhere, signal listener stopping"),
        }
    });
}
