//! One-shot initialization-complete signal. Dependents await it instead of
//! polling or sleeping for a fixed time.

use tokio::sync::watch;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

/// Cloneable receiving side of a [ReadySignal].
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn waiter(&self) -> ReadyWaiter {
        ReadyWaiter {
            rx: self.tx.subscribe(),
        }
    }

    /// Idempotent; later calls are no-ops.
    pub fn mark_ready(&self) {
        let changed = self.tx.send_if_modified(|ready| !std::mem::replace(ready, true));
        if changed {
            tracing::info!("service.ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ReadyWaiter {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Fails if the signal is dropped first.
    pub async fn wait(&mut self) -> Result<()> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::WorkerClosed { worker: "ready" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_resolve_after_mark_ready() {
        let signal = ReadySignal::new();
        let mut early = signal.waiter();
        assert!(!early.is_ready());

        let task = tokio::spawn(async move { early.wait().await });
        signal.mark_ready();
        signal.mark_ready();
        task.await.unwrap().unwrap();

        // Subscribing after the fact still sees the ready state.
        let mut late = signal.waiter();
        late.wait().await.unwrap();
        assert!(signal.is_ready());
    }

    #[tokio::test]
    async fn dropped_signal_fails_waiters() {
        let signal = ReadySignal::new();
        let mut waiter = signal.waiter();
        drop(signal);
        assert!(matches!(
            waiter.wait().await,
            Err(Error::WorkerClosed { worker: "ready" })
        ));
    }
}
