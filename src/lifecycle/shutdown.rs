//! Shutdown coordination for the gateway.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger shutdown and wait up to `grace` for `drained` to finish.
    ///
    /// Returns `false` if the grace period ran out first.
    pub async fn drain<F: Future>(&self, drained: F, grace: Duration) -> bool {
        self.trigger();
        match tokio::time::timeout(grace, drained).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period exceeded");
                false
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_notified() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out() {
        let shutdown = Shutdown::new();
        let finished = shutdown
            .drain(std::future::pending::<()>(), Duration::from_secs(5))
            .await;
        assert!(!finished);
    }

    #[tokio::test]
    async fn test_drain_waits_for_task() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        assert!(shutdown.drain(task, Duration::from_secs(5)).await);
    }
}
