use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cooperative cancellation scope.
///
/// Cancelling is idempotent. Dropping every clone of the handle cancels the scope too,
/// so a task can never outlive the last handle to it.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Task side of a cancellation scope.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/signal pair.
pub fn cancellation() -> (CancellationHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the scope is cancelled or its handle is gone.
    pub async fn cancelled(&mut self) {
        // Err means the sender was dropped, which counts as cancellation
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
