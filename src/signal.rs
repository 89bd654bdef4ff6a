//! Interrupt handling for graceful shutdown.
//!
//! Shutdown state is a watch channel handed explicitly to every worker —
//! there is no global flag. The sender side flips once, on the first
//! interrupt; workers finish their in-flight message and drain.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Create the shutdown channel, initially not shut down.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Spawn a task that flips the shutdown channel on the first CTRL+C.
pub fn spawn_ctrl_c_listener(tx: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for interrupt signal");
            return;
        }
        tracing::info!("CTRL+C detected. Preparing to shut down");
        // Receivers may already be gone if the pipeline drained on its own.
        let _ = tx.send(true);
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_starts_not_shut_down() {
        let (_tx, rx) = shutdown_channel();
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn send_is_observed_by_all_receivers() {
        let (tx, rx) = shutdown_channel();
        let mut a = rx.clone();
        let mut b = rx;
        tx.send(true).unwrap();
        a.changed().await.unwrap();
        b.changed().await.unwrap();
        assert!(*a.borrow());
        assert!(*b.borrow());
    }
}
