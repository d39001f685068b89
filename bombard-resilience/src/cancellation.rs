//! Cooperative flow cancellation
//!
//! A testing flow owns a [`FlowCancellation`]; every worker task carries a
//! [`CancellationWatch`] clone and checks it at suspension points. Stopping
//! a flow flips the signal and then waits for the registered workers to
//! drain before the flow is removed.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Cancellation source owned by one testing flow
#[derive(Debug)]
pub struct FlowCancellation {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
    active_workers: Arc<RwLock<u32>>,
}

impl FlowCancellation {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender,
            receiver,
            active_workers: Arc::new(RwLock::new(0)),
        }
    }

    /// Create a watch handle for a worker task
    pub fn watch(&self) -> CancellationWatch {
        CancellationWatch {
            receiver: self.receiver.clone(),
            active_workers: self.active_workers.clone(),
        }
    }

    /// Signal cancellation; idempotent
    pub fn cancel(&self) {
        if !*self.receiver.borrow() {
            info!("Flow cancellation requested");
            let _ = self.sender.send(true);
        }
    }

    /// Check whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Current number of registered worker tasks
    pub async fn active_worker_count(&self) -> u32 {
        *self.active_workers.read().await
    }

    /// Wait for all registered workers to deregister, up to `timeout`.
    ///
    /// Returns `true` when the flow reached quiescence in time.
    pub async fn await_quiescence(&self, timeout: Duration) -> bool {
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            let active = self.active_worker_count().await;
            if active == 0 {
                return true;
            }

            // Adaptive sleep based on worker count
            let sleep_duration = if active > 10 {
                Duration::from_millis(100)
            } else {
                Duration::from_millis(50)
            };

            tokio::time::sleep(sleep_duration).await;
        }

        debug!(
            "Quiescence wait timed out with {} workers still active",
            self.active_worker_count().await
        );
        false
    }
}

impl Default for FlowCancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker-side cancellation handle
#[derive(Debug, Clone)]
pub struct CancellationWatch {
    receiver: watch::Receiver<bool>,
    active_workers: Arc<RwLock<u32>>,
}

impl CancellationWatch {
    /// Check whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Suspend until cancellation is signalled.
    ///
    /// Also resolves if the owning flow is dropped, which counts as
    /// cancellation for a worker.
    pub async fn cancelled(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        let _ = self.receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Register this worker as active; returns the new count
    pub async fn register(&self) -> u32 {
        let mut count = self.active_workers.write().await;
        *count += 1;
        *count
    }

    /// Deregister this worker; returns the new count
    pub async fn deregister(&self) -> u32 {
        let mut count = self.active_workers.write().await;
        if *count > 0 {
            *count -= 1;
        }
        *count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let cancellation = FlowCancellation::new();
        assert!(!cancellation.is_cancelled());
        assert_eq!(cancellation.active_worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_worker_counting() {
        let cancellation = FlowCancellation::new();
        let watch = cancellation.watch();

        assert_eq!(watch.register().await, 1);
        assert_eq!(watch.register().await, 2);
        assert_eq!(watch.deregister().await, 1);
        assert_eq!(watch.deregister().await, 0);
        // Extra deregistration does not go negative
        assert_eq!(watch.deregister().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiting_workers() {
        let cancellation = FlowCancellation::new();
        let mut watch = cancellation.watch();

        let waiter = tokio::spawn(async move {
            watch.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancellation.cancel();
        cancellation.cancel(); // idempotent

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("worker should wake after cancel")
            .unwrap();
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn test_await_quiescence() {
        let cancellation = FlowCancellation::new();
        let watch = cancellation.watch();
        watch.register().await;

        // Not quiescent while a worker is registered
        assert!(!cancellation.await_quiescence(Duration::from_millis(120)).await);

        let deregister_watch = watch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            deregister_watch.deregister().await;
        });

        assert!(cancellation.await_quiescence(Duration::from_secs(2)).await);
    }
}
