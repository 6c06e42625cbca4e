//! One-shot shutdown signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Idempotent, broadcast-capable shutdown signal.
///
/// Cloning yields another handle to the same signal. The first call to
/// [`Shutdown::trigger`] flips the flag and wakes every waiter at once;
/// later calls are no-ops. Waiters that subscribe after the trigger observe
/// it immediately, unlike a broadcast channel where late receivers miss the
/// message.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the signal.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    /// Whether the signal has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Get the number of tasks currently waiting on the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
