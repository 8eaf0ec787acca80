//! In-process stand-ins for Redis and Postgres.
//!
//! Handles are cheap clones over shared state, so a test can keep one copy to
//! inspect and inject failures while the service under test owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use shared::models::VoteRecord;
use tokio::sync::Notify;

use crate::{
    connection::{ConnectError, Connector},
    queue::{QueueError, VoteQueue},
    store::{StoreError, VoteStore},
};

/// Decrements `counter` if it is non-zero. Returns whether it did.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
struct QueueInner {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
    down: AtomicBool,
    garbled_pops: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<QueueInner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items from oldest to newest.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .items
            .lock()
            .map(|items| items.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Simulates losing (or regaining) the queue server.
    pub fn set_available(&self, available: bool) {
        self.inner.down.store(!available, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// The next `count` pops remove their item but report an undecodable reply.
    pub fn garble_next_pops(&self, count: usize) {
        self.inner.garbled_pops.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.inner.down.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory queue is down".into()));
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl VoteQueue for MemoryQueue {
    async fn push(&self, vote: &str) -> Result<(), QueueError> {
        self.check_available()?;
        self.inner
            .items
            .lock()
            .map_err(|_| QueueError::Command("queue lock poisoned".into()))?
            .push_front(vote.to_string());
        self.inner.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<String, QueueError> {
        loop {
            self.check_available()?;
            let next = self
                .inner
                .items
                .lock()
                .map_err(|_| QueueError::Command("queue lock poisoned".into()))?
                .pop_back();
            if let Some(vote) = next {
                if take_one(&self.inner.garbled_pops) {
                    return Err(QueueError::Command(format!("undecodable reply for {:?}", vote)));
                }
                return Ok(vote);
            }
            self.inner.notify.notified().await;
        }
    }
}

#[derive(Default)]
struct StoreInner {
    records: Mutex<Vec<VoteRecord>>,
    schema: AtomicBool,
    down: AtomicBool,
    failing_inserts: AtomicUsize,
    failing_schema: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<VoteRecord> {
        self.inner.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn votes(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.vote).collect()
    }

    pub fn has_schema(&self) -> bool {
        self.inner.schema.load(Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.inner.down.store(!available, Ordering::SeqCst);
    }

    pub fn fail_next_inserts(&self, count: usize) {
        self.inner.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_schema(&self, count: usize) {
        self.inner.failing_schema.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check_available()?;
        if take_one(&self.inner.failing_schema) {
            return Err(StoreError::Unavailable);
        }
        self.inner.schema.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn record_vote(&self, vote: &str) -> Result<VoteRecord, StoreError> {
        self.check_available()?;
        if take_one(&self.inner.failing_inserts) {
            return Err(StoreError::Unavailable);
        }

        let mut records = self.inner.records.lock().map_err(|_| StoreError::LockFailed)?;
        let id = records.last().map(|r| r.id + 1).unwrap_or(1);
        let record = VoteRecord { id, vote: vote.to_string() };
        records.push(record.clone());
        Ok(record)
    }

    async fn count_by_vote(&self) -> Result<Vec<(String, i64)>, StoreError> {
        self.check_available()?;
        let records = self.inner.records.lock().map_err(|_| StoreError::LockFailed)?;

        let mut counts: Vec<(String, i64)> = Vec::new();
        for record in records.iter() {
            match counts.iter_mut().find(|(vote, _)| *vote == record.vote) {
                Some((_, count)) => *count += 1,
                None => counts.push((record.vote.clone(), 1)),
            }
        }
        Ok(counts)
    }
}

#[derive(Default)]
struct ConnectorStats {
    failures: AtomicUsize,
    attempts: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Hands out clones of `target`, refusing the first `n` attempts when built
/// with [`MemoryConnector::failing`].
#[derive(Clone)]
pub struct MemoryConnector<T> {
    name: &'static str,
    target: T,
    stats: Arc<ConnectorStats>,
}

impl<T> MemoryConnector<T> {
    pub fn new(name: &'static str, target: T) -> Self {
        Self {
            name,
            target,
            stats: Arc::default(),
        }
    }

    pub fn failing(self, attempts: usize) -> Self {
        self.fail_next(attempts);
        self
    }

    pub fn fail_next(&self, attempts: usize) {
        self.stats.failures.store(attempts, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.stats.attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.stats.disconnects.load(Ordering::SeqCst)
    }
}

#[rocket::async_trait]
impl<T> Connector for MemoryConnector<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Connection = T;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn connect(&self) -> Result<T, ConnectError> {
        self.stats.attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.stats.failures) {
            return Err(ConnectError::Unreachable(self.name));
        }
        Ok(self.target.clone())
    }

    async fn disconnect(&self, _conn: T) {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = MemoryQueue::new();
        for vote in ["cats", "dogs", "cats"] {
            queue.push(vote).await.unwrap();
        }
        assert_eq!(queue.snapshot(), vec!["cats", "dogs", "cats"]);

        assert_eq!(queue.pop().await.unwrap(), "cats");
        assert_eq!(queue.pop().await.unwrap(), "dogs");
        assert_eq!(queue.pop().await.unwrap(), "cats");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = MemoryQueue::new();
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        queue.push("dogs").await.unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), "dogs");
    }

    #[tokio::test]
    async fn test_blocked_pop_sees_outage() {
        let queue = MemoryQueue::new();
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.set_available(false);
        assert!(matches!(handle.await.unwrap(), Err(QueueError::Unavailable(_))));
        assert!(matches!(queue.push("cats").await, Err(QueueError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_garbled_pop_still_removes_item() {
        let queue = MemoryQueue::new();
        queue.push("cats").await.unwrap();
        queue.push("dogs").await.unwrap();
        queue.garble_next_pops(1);

        assert!(matches!(queue.pop().await, Err(QueueError::Command(_))));
        assert_eq!(queue.snapshot(), vec!["dogs"]);
        assert_eq!(queue.pop().await.unwrap(), "dogs");
    }

    #[tokio::test]
    async fn test_store_ids_increase() {
        let store = MemoryStore::new();
        assert_eq!(store.record_vote("cats").await.unwrap().id, 1);
        assert_eq!(store.record_vote("cats").await.unwrap().id, 2);

        store.fail_next_inserts(1);
        assert!(store.record_vote("dogs").await.is_err());
        assert_eq!(store.record_vote("dogs").await.unwrap().id, 3);

        let mut counts = store.count_by_vote().await.unwrap();
        counts.sort();
        assert_eq!(counts, vec![("cats".to_string(), 2), ("dogs".to_string(), 1)]);
    }
}
