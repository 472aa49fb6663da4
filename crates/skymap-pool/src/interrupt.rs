//! Cancellation signal shared between the CLI and pool supervisors
//!
//! Workers never install signal handlers themselves; cancellation is the
//! supervisor's job, delivered by terminating the pool. The embedding
//! application raises this handle (typically from a Ctrl-C watcher) and
//! every in-flight batch observes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag with async observation
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal; wakes every task waiting in [`Interrupt::raised`]
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been raised
    pub async fn raised(&self) {
        loop {
            // Register interest before checking the flag so a raise() in
            // between cannot be missed.
            let notified = self.inner.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn raise_wakes_waiters() {
        let interrupt = Interrupt::new();
        let observer = interrupt.clone();
        let waiter = tokio::spawn(async move { observer.raised().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!interrupt.is_raised());
        interrupt.raise();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn raised_resolves_immediately_when_already_set() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        tokio::time::timeout(Duration::from_millis(100), interrupt.raised())
            .await
            .expect("already-raised signal resolves at once");
    }
}
