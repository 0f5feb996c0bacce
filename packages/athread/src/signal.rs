use tokio::sync::Semaphore;

/// Cross-thread wakeup for the consumer.
///
/// Notifications are counted, so a notification sent while the consumer
/// is not waiting is not lost. Each [`wait`](Self::wait) consumes exactly one.
///
/// [`notify`](Self::notify) never blocks and can be called from any thread,
/// including threads outside of the async runtime.
#[derive(Debug)]
pub(crate) struct Signal(Semaphore);

impl Signal {
    pub(crate) fn new() -> Self {
        Self(Semaphore::new(0))
    }

    /// Add one notification, waking the consumer if it's waiting
    #[inline]
    pub(crate) fn notify(&self) {
        self.0.add_permits(1);
    }

    /// Wait for one notification and consume it.
    ///
    /// This is cancel-safe: if the future is dropped before it completes,
    /// no notification is consumed.
    pub(crate) async fn wait(&self) {
        // the semaphore is never closed
        if let Ok(permit) = self.0.acquire().await {
            permit.forget();
        }
    }

    /// Number of notifications not yet consumed
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.0.available_permits()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn test_notify_before_wait_is_not_lost() {
        let signal = Signal::new();
        signal.notify();
        signal.notify();
        assert_eq!(signal.pending(), 2);
        signal.wait().await;
        signal.wait().await;
        assert_eq!(signal.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_notify_from_thread_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        let s2 = Arc::clone(&signal);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            s2.notify();
        });
        tokio::time::timeout(Duration::from_secs(5), signal.wait())
            .await
            .expect("waiter was not woken");
        thread.join().unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cancelled_wait_keeps_notification() {
        let signal = Signal::new();
        let result = tokio::time::timeout(Duration::from_millis(10), signal.wait()).await;
        assert!(result.is_err());
        signal.notify();
        assert_eq!(signal.pending(), 1);
        signal.wait().await;
    }
}
