use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registry of named background tasks started in registration order and
/// stopped in reverse registration order on shutdown. Each registered task
/// receives the manager's [`CancellationToken`] and `watch` shutdown signal
/// at spawn time so it can exit its own loop promptly; the manager itself
/// only tracks join handles and drives the ordered teardown.
pub struct LifecycleManager {
    cancellation: CancellationToken,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            cancellation: CancellationToken::new(),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Registers an already-spawned task under `name`. Tasks must be
    /// registered in the order they were started so `shutdown` can unwind
    /// them in reverse.
    pub fn register(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.push((name.into(), handle));
    }

    /// Cancels the shared context, signals every task to stop, then joins
    /// them in reverse registration order. Idempotent in the sense that
    /// calling it twice is safe: the second call has no tasks left to join.
    pub async fn shutdown(&mut self) {
        info!("lifecycle manager shutting down");
        self.cancellation.cancel();
        let _ = self.shutdown_tx.send(true);

        while let Some((name, handle)) = self.tasks.pop() {
            info!(task = %name, "stopping task");
            if let Err(e) = handle.await {
                warn!(task = %name, error = %e, "task did not stop cleanly");
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_stops_tasks_in_reverse_order() {
        let mut manager = LifecycleManager::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order = order.clone();
            let mut shutdown_rx = manager.shutdown_signal();
            let name = name.to_string();
            let handle = tokio::spawn(async move {
                shutdown_rx.changed().await.ok();
                order.lock().unwrap().push(name);
            });
            manager.register("task", handle);
        }

        manager.shutdown().await;
        assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
    }
}
