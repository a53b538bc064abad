//! Shutdown signalling between the client handle and its background tasks.

use std::time::Duration;
use tokio::sync::watch;

/// Owned by the client; flips the flag every task watches
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Clear the flag before a new set of tasks starts
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Task-side view of the shutdown flag. A dropped trigger counts as shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        let flag = *self.rx.borrow();
        flag || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown is requested
    pub async fn triggered(&mut self) {
        loop {
            if self.is_triggered() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless shutdown arrives first. Returns true on shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let elapsed = tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        };
        !elapsed || self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_interrupted_by_trigger() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();

        let handle = tokio::spawn(async move { signal.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let interrupted = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_trigger() {
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.subscribe();
        assert!(!signal.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_shutdown() {
        let trigger = ShutdownTrigger::new();
        let signal = trigger.subscribe();
        drop(trigger);
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_reset() {
        let trigger = ShutdownTrigger::new();
        let signal = trigger.subscribe();
        trigger.trigger();
        assert!(signal.is_triggered());
        trigger.reset();
        assert!(!signal.is_triggered());
    }
}
