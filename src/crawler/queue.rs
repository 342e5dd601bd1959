//! Work queues between pipeline stages
//!
//! Each queue tracks its unfinished items the way a joinable queue does:
//! `push` counts an item in, `task_done` counts it out, and `join` waits
//! until the count reaches zero. A popped item is not finished until the
//! worker says so, so items parked for a retry keep the queue open.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

/// A queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Item(T),
    /// Tells the consuming worker to exit
    Shutdown,
}

/// Order in which items leave the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Fifo,
    /// Newest first, which makes the crawl depth-first
    Lifo,
}

/// Joinable async queue with a single consumer
pub struct WorkQueue<T> {
    name: &'static str,
    discipline: Discipline,
    items: Mutex<VecDeque<Message<T>>>,
    notify: Notify,
    unfinished: watch::Sender<usize>,
}

impl<T> WorkQueue<T> {
    pub fn new(name: &'static str, discipline: Discipline) -> Self {
        let (unfinished, _) = watch::channel(0);
        Self {
            name,
            discipline,
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            unfinished,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message<T>>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds an item and counts it as unfinished
    pub fn push(&self, item: T) {
        self.unfinished.send_modify(|count| *count += 1);
        self.lock().push_back(Message::Item(item));
        self.notify.notify_one();
    }

    /// Asks the consumer to exit once it has taken the items already queued
    ///
    /// The shutdown message is not counted as unfinished work.
    pub fn shutdown(&self) {
        {
            let mut items = self.lock();
            match self.discipline {
                Discipline::Fifo => items.push_back(Message::Shutdown),
                Discipline::Lifo => items.push_front(Message::Shutdown),
            }
        }
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<Message<T>> {
        let mut items = self.lock();
        match self.discipline {
            Discipline::Fifo => items.pop_front(),
            Discipline::Lifo => items.pop_back(),
        }
    }

    /// Waits up to `timeout` for the next message
    ///
    /// # Returns
    ///
    /// * `Some(Message)` - The next item, or the shutdown message
    /// * `None` - Nothing arrived before the timeout
    pub async fn pop(&self, timeout: Duration) -> Option<Message<T>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Marks one popped item as finished
    pub fn task_done(&self) {
        self.unfinished
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Waits until every pushed item has been marked finished
    pub async fn join(&self) {
        let mut receiver = self.unfinished.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    /// Number of items pushed but not yet finished
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Number of messages waiting to be popped
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(20);

    async fn pop_item(queue: &WorkQueue<u32>) -> Option<u32> {
        match queue.pop(SHORT).await {
            Some(Message::Item(item)) => Some(item),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new("process", Discipline::Fifo);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(pop_item(&queue).await, Some(1));
        assert_eq!(pop_item(&queue).await, Some(2));
        assert_eq!(pop_item(&queue).await, Some(3));
    }

    #[tokio::test]
    async fn test_lifo_order() {
        let queue = WorkQueue::new("fetch", Discipline::Lifo);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(pop_item(&queue).await, Some(3));
        assert_eq!(pop_item(&queue).await, Some(2));
        assert_eq!(pop_item(&queue).await, Some(1));
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let queue: WorkQueue<u32> = WorkQueue::new("load", Discipline::Fifo);
        assert!(queue.pop(SHORT).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_comes_after_queued_items() {
        for discipline in [Discipline::Fifo, Discipline::Lifo] {
            let queue = WorkQueue::new("q", discipline);
            queue.push(7);
            queue.shutdown();

            assert_eq!(queue.pop(SHORT).await, Some(Message::Item(7)));
            assert_eq!(queue.pop(SHORT).await, Some(Message::Shutdown));
        }
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(WorkQueue::new("q", Discipline::Fifo));
        let producer = Arc::clone(&queue);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.push(42);
        });

        let message = queue.pop(Duration::from_secs(5)).await;
        assert_eq!(message, Some(Message::Item(42)));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_waits_for_task_done() {
        let queue = Arc::new(WorkQueue::new("q", Discipline::Fifo));
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.unfinished(), 2);

        let consumer = Arc::clone(&queue);
        let handle = tokio::spawn(async move {
            while let Some(Message::Item(_)) = consumer.pop(SHORT).await {
                consumer.task_done();
            }
        });

        tokio::time::timeout(Duration::from_secs(5), queue.join())
            .await
            .expect("join should finish once both items are done");
        assert_eq!(queue.unfinished(), 0);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_on_empty_queue_returns() {
        let queue: WorkQueue<u32> = WorkQueue::new("q", Discipline::Lifo);
        tokio::time::timeout(Duration::from_millis(100), queue.join())
            .await
            .unwrap();
    }

    #[test]
    fn test_task_done_saturates() {
        let queue: WorkQueue<u32> = WorkQueue::new("q", Discipline::Fifo);
        queue.task_done();
        assert_eq!(queue.unfinished(), 0);
    }
}
