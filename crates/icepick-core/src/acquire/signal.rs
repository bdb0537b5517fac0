use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// A cancellation signal that supports interruptible async waits.
///
/// Unlike `tokio::time::sleep()`, waits on this signal return as soon as
/// the signal is triggered.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal, waking every pending wait.
    pub fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for `duration` or until the signal is triggered.
    ///
    /// Returns `true` if cancelled, `false` if the wait completed normally.
    pub async fn wait(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not lost
        notified.as_mut().enable();

        if self.is_cancelled() {
            return true;
        }

        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(duration) => self.is_cancelled(),
        }
    }
}
