// MIT License - Copyright (c) 2026 Peter Wright
// Outbound command queue

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// FIFO of payloads waiting for the connection task to write them.
///
/// `push` never blocks and works in any connection state. Whatever is still
/// queued when a connection opens is written before anything else happens
/// on it.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload and wake the connection task.
    pub fn push(&self, payload: Vec<u8>) {
        self.lock().push_back(payload);
        self.notify.notify_one();
    }

    /// Put back a payload whose write failed, ahead of everything else.
    pub fn push_front(&self, payload: Vec<u8>) {
        self.lock().push_front(payload);
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves after the next `push` (or immediately if one happened since
    /// the last wake-up).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = OutboundQueue::new();
        queue.push(b"SICD\r".to_vec());
        queue.push(b"MV40\r".to_vec());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(b"SICD\r".to_vec()));
        assert_eq!(queue.pop(), Some(b"MV40\r".to_vec()));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_front_requeues_failed_write() {
        let queue = OutboundQueue::new();
        queue.push(b"A\r".to_vec());
        queue.push(b"B\r".to_vec());
        let first = queue.pop().unwrap();
        queue.push_front(first);
        assert_eq!(queue.pop(), Some(b"A\r".to_vec()));
        assert_eq!(queue.pop(), Some(b"B\r".to_vec()));
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = std::sync::Arc::new(OutboundQueue::new());
        let pusher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.push(b"PW?\r".to_vec());
        });
        tokio::time::timeout(Duration::from_secs(2), queue.notified())
            .await
            .expect("push did not wake the waiter");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_push_before_wait_is_not_lost() {
        let queue = OutboundQueue::new();
        queue.push(b"PW?\r".to_vec());
        tokio::time::timeout(Duration::from_secs(2), queue.notified())
            .await
            .expect("stored permit was lost");
    }
}
