//! Cooperative cancellation primitive for a single download run.
//!
//! A [`CancelHandle`] is held by whoever may request cancellation; every
//! suspension point in the run holds a [`CancelSignal`] clone. The signal
//! fires once and stays fired, so late subscribers observe cancellation
//! immediately. Backoff sleeps and transfer awaits race against
//! [`CancelSignal::cancelled`] with `tokio::select!`.

use tokio::sync::watch;

/// Creates a connected cancellation handle/signal pair.
#[must_use]
pub fn pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Requests cancellation of the associated run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fires the cancellation signal. Safe to call more than once.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns a new signal observing this handle.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Whether cancellation has already been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observes a [`CancelHandle`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// If the handle is dropped without cancelling, the run can never be
    /// cancelled any more and this future stays pending forever.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
