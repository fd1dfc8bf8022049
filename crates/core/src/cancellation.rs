use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation signal.
///
/// Every clone observes the same state; once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    /// Creates a signal that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels every task observing this signal.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns whether the signal was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes once the signal is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Cancellation;

    #[tokio::test]
    async fn clones_observe_cancellation() {
        let cancellation = Cancellation::new();
        let observer = cancellation.clone();

        let waiter = tokio::spawn(async move {
            observer.cancelled().await;
            observer.is_cancelled()
        });

        cancellation.cancel();
        let observed = waiter.await.unwrap_or(false);
        assert!(observed);
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_signal_stays_pending() {
        let cancellation = Cancellation::new();
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), cancellation.cancelled()).await;
        assert!(outcome.is_err());
    }
}
