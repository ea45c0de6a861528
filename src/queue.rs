use tokio::sync::mpsc;

use crate::error::QueueError;

/// FIFO, multi-consumer job queue with a fixed capacity. `enqueue` never
/// blocks: it fails fast with `QueueError::Full` so callers can persist a
/// FAILED job rather than stall the caller.
pub struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Blocks until an item is available or the queue is closed.
    pub async fn dequeue(&self) -> Result<T, QueueError> {
        self.rx.lock().await.recv().await.ok_or(QueueError::Closed)
    }

    /// Non-blocking dequeue; returns `Ok(None)` if currently empty but open.
    pub fn try_dequeue(&self) -> Result<Option<T>, QueueError> {
        match self.rx.try_lock() {
            Ok(mut rx) => match rx.try_recv() {
                Ok(item) => Ok(Some(item)),
                Err(mpsc::error::TryRecvError::Empty) => Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => Err(QueueError::Closed),
            },
            Err(_) => Ok(None),
        }
    }

    /// Approximate size: capacity minus remaining send permits. Racy under
    /// concurrent senders/receivers but sufficient for the backpressure gate.
    pub fn size(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_dequeue_round_trips() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert!(matches!(q.enqueue(3), Err(QueueError::Full)));
        assert_eq!(q.dequeue().await.unwrap(), 1);
        assert_eq!(q.dequeue().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn closed_queue_rejects_enqueue_and_unblocks_dequeue() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        q.close().await;
        assert!(matches!(q.enqueue(1), Err(QueueError::Closed)));
        assert!(matches!(q.dequeue().await, Err(QueueError::Closed)));
    }

    #[test]
    fn try_dequeue_is_non_blocking_when_empty() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        assert_eq!(q.try_dequeue().unwrap(), None);
    }
}
