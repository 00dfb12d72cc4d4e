//! User interrupt (Ctrl-C) as an awaitable signal.
//!
//! [`Interrupt`] is a cloneable flag backed by a `watch` channel. The
//! driver races every suspension point against [`Interrupt::triggered`]
//! and resets the flag once it has handled the interrupt.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Raise the interrupt.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Clear a handled interrupt.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the interrupt is raised (immediately if it already is).
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of `self`, so this only
        // errors if it was dropped, in which case we never resolve.
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Trigger on every Ctrl-C for the rest of the process.
    pub fn listen_for_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupt received");
                interrupt.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiter() {
        let interrupt = Interrupt::new();
        let waiter = interrupt.clone();
        let handle = tokio::spawn(async move { waiter.triggered().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        interrupt.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(interrupt.is_triggered());
    }

    #[tokio::test]
    async fn test_reset_clears() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        interrupt.triggered().await;
        interrupt.reset();
        assert!(!interrupt.is_triggered());

        let pending = tokio::time::timeout(Duration::from_millis(20), interrupt.triggered()).await;
        assert!(pending.is_err());
    }
}
