//! OS signal handling.
//!
//! SIGINT and SIGTERM are translated into a trigger of the process-wide
//! [`Shutdown`] signal. A second signal while shutting down is only logged;
//! the drain deadline bounds how long the process lingers.

use crate::lifecycle::Shutdown;

/// Which OS signal was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for the next SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<SignalKind> {
    use tokio::signal::unix::{signal, SignalKind as UnixSignal};

    let mut terminate = signal(UnixSignal::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| SignalKind::Interrupt),
        _ = terminate.recv() => Ok(SignalKind::Terminate),
    }
}

/// Wait for the next Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<SignalKind> {
    tokio::signal::ctrl_c().await.map(|_| SignalKind::Interrupt)
}

/// Spawn a task that triggers `shutdown` on the first OS signal.
pub fn spawn_signal_listener(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match wait_for_signal().await {
                Ok(kind) => {
                    if shutdown.trigger() {
                        tracing::info!(signal = %kind, "Shutdown signal received");
                    } else {
                        tracing::warn!(signal = %kind, "Already shutting down");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handler");
                    return;
                }
            }
        }
    })
}
