//! In-memory bounded FIFO queue.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::queue::{Message, Queue, QueueError, QueueOptions};

/// Bounded FIFO queue shared between producers and consumers.
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Message>>,
    available: Notify,
    options: QueueOptions,
}

impl MemoryQueue {
    pub fn new(options: QueueOptions) -> Result<Self, QueueError> {
        options.validate()?;
        Ok(Self {
            messages: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            options,
        })
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Pop up to `batch_size` messages, oldest first.
    pub fn pop_batch(&self) -> Vec<Message> {
        let mut messages = self.messages.lock().expect("queue mutex poisoned");
        let n = messages.len().min(self.options.batch_size);
        messages.drain(..n).collect()
    }

    /// Pop the oldest message, waiting up to `timeout` for one to arrive.
    pub async fn pop_wait(&self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.take() {
                return Some(message);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take();
            }
        }
    }

    fn take(&self) -> Option<Message> {
        self.messages.lock().expect("queue mutex poisoned").pop_front()
    }
}

impl Queue for MemoryQueue {
    fn push(&self, message: Message) -> Result<(), QueueError> {
        {
            let mut messages = self.messages.lock().expect("queue mutex poisoned");
            if messages.len() >= self.options.max_size {
                return Err(QueueError::Full(self.options.max_size));
            }
            messages.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Option<Message>, QueueError> {
        Ok(self.take())
    }

    fn peek(&self) -> Result<Option<Message>, QueueError> {
        Ok(self.messages.lock().expect("queue mutex poisoned").front().cloned())
    }

    fn len(&self) -> Result<usize, QueueError> {
        Ok(self.messages.lock().expect("queue mutex poisoned").len())
    }

    fn clear(&self) -> Result<(), QueueError> {
        self.messages.lock().expect("queue mutex poisoned").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queue(max_size: usize) -> MemoryQueue {
        MemoryQueue::new(QueueOptions { max_size, batch_size: 2, ..QueueOptions::default() }).unwrap()
    }

    #[test]
    fn fifo_order_and_peek() {
        let q = queue(10);
        q.push(Message::new("first")).unwrap();
        q.push(Message::new("second")).unwrap();

        assert_eq!(q.peek().unwrap().unwrap().body, b"first");
        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.pop().unwrap().unwrap().body, b"first");
        assert_eq!(q.pop().unwrap().unwrap().body, b"second");
        assert!(q.pop().unwrap().is_none());
        assert!(q.is_empty().unwrap());
    }

    #[test]
    fn rejects_push_when_full() {
        let q = queue(1);
        q.push(Message::new("a")).unwrap();
        assert_eq!(q.push(Message::new("b")), Err(QueueError::Full(1)));

        q.clear().unwrap();
        assert!(q.push(Message::new("c")).is_ok());
    }

    #[test]
    fn batch_respects_batch_size() {
        let q = queue(10);
        for i in 0..5u8 {
            q.push(Message::new(vec![i])).unwrap();
        }
        let batch = q.pop_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, vec![0]);
        assert_eq!(q.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn pop_wait_wakes_on_push() {
        let q = Arc::new(queue(10));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.pop_wait(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(Message::new("late")).unwrap();

        let message = consumer.await.unwrap().expect("message not delivered");
        assert_eq!(message.body, b"late");
    }

    #[tokio::test]
    async fn pop_wait_times_out_empty() {
        let q = queue(10);
        assert!(q.pop_wait(Duration::from_millis(20)).await.is_none());
    }
}
