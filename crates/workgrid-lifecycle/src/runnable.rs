//! Workload business logic and its cancellation signal.

use async_trait::async_trait;
use tokio::sync::watch;

use workgrid_core::Workload;

/// The code a workload actually runs.
///
/// `run` should return promptly once `cancel` fires. Returning `Ok` marks
/// the workload STOPPED, returning `Err` marks it ERROR with the error
/// text; a panic is treated like an error.
#[async_trait]
pub trait WorkloadRunnable: Send + Sync + 'static {
    async fn run(&self, workload: &Workload, cancel: CancelSignal) -> anyhow::Result<()>;
}

/// Receiving half of a context's stop signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested or the owning context is gone.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_send() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            signal.is_cancelled()
        });

        tx.send(true).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("dropped sender should release waiters");
    }
}
