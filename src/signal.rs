//! Capacity-1 signal slots
//!
//! Wake and interrupt signals are unit values delivered over a slot that holds at
//! most one pending signal. Posting while a signal is already pending is a no-op:
//! the pending one will be drained, so the newer post is discarded.

use tokio::sync::mpsc;

/// Create a connected notifier/listener pair
#[must_use]
pub fn slot() -> (Notifier, Listener) {
    let (tx, rx) = mpsc::channel(1);
    (Notifier { tx }, Listener { rx })
}

/// Posting half of a signal slot
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<()>,
}

impl Notifier {
    /// Post a signal without blocking
    ///
    /// Returns `false` when a signal is already pending or the listener is gone.
    pub fn notify(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Whether the listening half has been dropped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a signal slot
#[derive(Debug)]
pub struct Listener {
    rx: mpsc::Receiver<()>,
}

impl Listener {
    /// Wait for the next signal
    ///
    /// Returns `false` once every notifier has been dropped and nothing is pending.
    pub async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Take a pending signal, if any
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Wait for a signal, never resolving if every notifier is gone
    ///
    /// Use inside `tokio::select!` where a closed slot must not look like a signal.
    pub async fn fired(&mut self) {
        if !self.recv().await {
            std::future::pending::<()>().await;
        }
    }
}
