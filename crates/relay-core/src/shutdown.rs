use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// The one piece of shared mutable state in the pipeline: a set-once flag
/// that every worker's blocking wait observes.
///
/// Uses an `AtomicBool` for the "is it set" check (cheap, lock-free) and a
/// `Notify` to wake up anyone parked in [`ShutdownFlag::wait`] the instant
/// [`ShutdownFlag::set`] is called, rather than making every waiter poll.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Request shutdown. Idempotent — calling this more than once has no
    /// further effect.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `timeout`, waking early if shutdown is requested.
    /// Returns `true` if woken by shutdown, `false` if the timeout elapsed
    /// first.
    pub async fn wait(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => self.is_set(),
            _ = tokio::time::sleep(timeout) => self.is_set(),
        }
    }
}
