//! Cooperative cancellation
//!
//! Each run carries a [`CancelToken`] that executors receive through their
//! node context. Cancellation is cooperative: the scheduler signals the
//! token when a guard trips or the HALT policy fires, and executors observe
//! it at I/O boundaries (the wrapper also checks between retry attempts).
//! Nothing is forcibly interrupted mid-operation beyond the per-node
//! timeout scope.

use tokio::sync::watch;

/// Signalling side of a cancellation pair
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every token cloned from this handle
    pub fn cancel(&self) {
        // Receivers may all have been dropped; that's fine
        let _ = self.tx.send(true);
    }

    /// Whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observer side handed to executors
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a connected (handle, token) pair
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that can never be cancelled (for standalone executor use)
    pub fn never() -> CancelToken {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive forever so the channel never closes
        std::mem::forget(tx);
        CancelToken { rx }
    }

    /// Whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signalled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Sender dropped without signalling: treat as never-cancelled
                std::future::pending::<()>().await;
            }
        }
    }
}
