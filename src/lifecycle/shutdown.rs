//! Shutdown coordination primitives.
//!
//! - [`Shutdown`]: an external cancellation source a caller hands to
//!   `start()` (and may share with other long-running tasks).
//! - [`StopSignal`]: the controller's internal one-shot signal, fired once
//!   per run when the service leaves `Running`.

use std::future::Future;

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Any number of tasks can subscribe; a trigger is never lost, even when it
/// happens before a subscriber starts waiting.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Future that resolves once [`trigger`](Self::trigger) has been called.
    ///
    /// If the coordinator is dropped without triggering, the future never resolves.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let triggered = rx.wait_for(|triggered| *triggered).await.is_ok();
            if !triggered {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot broadcast used to wake the serve and watcher tasks of a run.
///
/// Firing twice is a programming error; the controller only fires it while
/// holding the state lock during the `Running → Stopping` transition.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `false` if it had already been fired.
    pub fn fire(&self) -> bool {
        let first = self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        });
        debug_assert!(first, "stop signal fired twice");
        first
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Future that resolves when the signal fires or the signal is dropped.
    pub fn fired(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|fired| *fired).await;
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
