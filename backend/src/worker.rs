use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    connection::{ConnectionManager, Connector, Shutdown, RETRY_DELAY},
    queue::{QueueError, VoteQueue},
    store::{SchemaConnector, VoteStore},
};

/// What the worker did before it was shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub recorded: u64,
    pub dropped: u64,
}

/// Drains the vote queue into the store, one item at a time.
///
/// Store failures after a pop lose that vote: the connection is recycled and
/// the item is not put back.
pub struct TallyWorker<Q, S>
where
    Q: Connector,
    Q::Connection: VoteQueue,
    S: Connector,
    S::Connection: VoteStore,
{
    queue: ConnectionManager<Q>,
    store: ConnectionManager<SchemaConnector<S>>,
    retry_delay: Duration,
    shutdown: Shutdown,
}

impl<Q, S> TallyWorker<Q, S>
where
    Q: Connector,
    Q::Connection: VoteQueue,
    S: Connector,
    S::Connection: VoteStore,
{
    pub fn new(queue: Q, store: S, shutdown: Shutdown) -> Self {
        Self {
            queue: ConnectionManager::new(queue, shutdown.clone()),
            store: ConnectionManager::new(SchemaConnector(store), shutdown.clone()),
            retry_delay: RETRY_DELAY,
            shutdown,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.queue = self.queue.with_retry_delay(retry_delay);
        self.store = self.store.with_retry_delay(retry_delay);
        self.retry_delay = retry_delay;
        self
    }

    pub async fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport::default();

        if self.store.acquire().await.is_none() {
            info!("Shutdown requested before the store became reachable");
            return report;
        }
        info!("⏳ Worker is running and waiting for votes...");

        loop {
            if self.store.acquire().await.is_none() {
                break;
            }
            let Some(queue) = self.queue.acquire().await else { break };

            let popped = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                popped = queue.pop() => popped,
            };

            let vote = match popped {
                Ok(vote) => vote,
                Err(QueueError::Unavailable(e)) => {
                    warn!("Could not connect to {}: {}", self.queue.connector().name(), e);
                    warn!("Retrying in {} seconds...", self.retry_delay.as_secs_f32());
                    self.queue.invalidate().await;
                    if !self.shutdown.sleep(self.retry_delay).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    // BRPOP already removed the item; only the reply was unusable.
                    error!("An error occurred: {}; popped vote dropped", e);
                    report.dropped += 1;
                    self.store.invalidate().await;
                    continue;
                }
            };

            let Some(store) = self.store.acquire().await else {
                error!(vote = %vote, "Shutdown before the vote could be stored; dropping it");
                report.dropped += 1;
                break;
            };

            match store.record_vote(&vote).await {
                Ok(record) => {
                    info!(id = record.id, "Processed a vote for: {}", record.vote);
                    report.recorded += 1;
                }
                Err(e) => {
                    error!(vote = %vote, "An error occurred: {}; vote dropped", e);
                    report.dropped += 1;
                    self.store.invalidate().await;
                }
            }
        }

        info!(recorded = report.recorded, dropped = report.dropped, "🛑 Worker stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryQueue, MemoryStore};
    use tokio::{sync::watch, task::JoinHandle, time::Instant};

    struct Harness {
        queue: MemoryQueue,
        store: MemoryStore,
        queue_connector: MemoryConnector<MemoryQueue>,
        store_connector: MemoryConnector<MemoryStore>,
        tx: watch::Sender<bool>,
        handle: JoinHandle<WorkerReport>,
    }

    fn spawn_worker(queue_failures: usize, store_failures: usize) -> Harness {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let queue_connector = MemoryConnector::new("queue", queue.clone()).failing(queue_failures);
        let store_connector = MemoryConnector::new("store", store.clone()).failing(store_failures);
        let (tx, shutdown) = Shutdown::new();
        let worker = TallyWorker::new(queue_connector.clone(), store_connector.clone(), shutdown);
        let handle = tokio::spawn(worker.run());

        Harness { queue, store, queue_connector, store_connector, tx, handle }
    }

    async fn wait_for_records(store: &MemoryStore, count: usize) {
        while store.records().len() < count {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    impl Harness {
        async fn stop(self) -> WorkerReport {
            self.tx.send(true).unwrap();
            self.handle.await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_queue_in_order() {
        let h = spawn_worker(0, 0);
        for vote in ["cats", "dogs", "cats"] {
            h.queue.push(vote).await.unwrap();
        }

        wait_for_records(&h.store, 3).await;
        assert_eq!(h.store.votes(), vec!["cats", "dogs", "cats"]);
        assert!(h.store.has_schema());
        assert!(h.queue.is_empty());

        let report = h.stop().await;
        assert_eq!(report, WorkerReport { recorded: 3, dropped: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_retry_before_running() {
        let h = spawn_worker(0, 2);
        let start = Instant::now();
        h.queue.push("dogs").await.unwrap();

        wait_for_records(&h.store, 1).await;
        assert!(start.elapsed() >= RETRY_DELAY * 2);
        assert_eq!(h.store_connector.attempts(), 3);
        assert_eq!(h.store.votes(), vec!["dogs"]);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_unreachable_at_startup() {
        let h = spawn_worker(3, 0);
        let start = Instant::now();
        h.queue.push("cats").await.unwrap();
        h.queue.push("dogs").await.unwrap();

        tokio::time::sleep(RETRY_DELAY * 2).await;
        assert!(h.store.records().is_empty());
        assert_eq!(h.queue.len(), 2);

        wait_for_records(&h.store, 2).await;
        assert!(start.elapsed() >= RETRY_DELAY * 3);
        assert_eq!(h.queue_connector.attempts(), 4);
        assert_eq!(h.store.votes(), vec!["cats", "dogs"]);

        let report = h.stop().await;
        assert_eq!(report.recorded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_loss_mid_run_reconnects() {
        let h = spawn_worker(0, 0);
        h.queue.push("cats").await.unwrap();
        wait_for_records(&h.store, 1).await;

        h.queue.set_available(false);
        tokio::time::sleep(RETRY_DELAY * 3).await;
        assert!(h.queue_connector.attempts() >= 2);

        h.queue.set_available(true);
        h.queue.push("dogs").await.unwrap();
        wait_for_records(&h.store, 2).await;
        assert_eq!(h.store.votes(), vec!["cats", "dogs"]);

        let report = h.stop().await;
        assert_eq!(report, WorkerReport { recorded: 2, dropped: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_insert_drops_vote_and_recovers() {
        let h = spawn_worker(0, 0);
        wait_for_store_connection(&h.store).await;

        h.store.fail_next_inserts(1);
        for vote in ["cats", "dogs", "cats"] {
            h.queue.push(vote).await.unwrap();
        }

        wait_for_records(&h.store, 2).await;
        assert_eq!(h.store.votes(), vec!["dogs", "cats"]);
        assert!(h.queue.is_empty());
        assert_eq!(h.store_connector.attempts(), 2);
        assert_eq!(h.store_connector.disconnects(), 1);

        let report = h.stop().await;
        assert_eq!(report, WorkerReport { recorded: 2, dropped: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_reply_counts_as_dropped() {
        let h = spawn_worker(0, 0);
        wait_for_store_connection(&h.store).await;

        h.queue.garble_next_pops(1);
        h.queue.push("cats").await.unwrap();
        h.queue.push("dogs").await.unwrap();

        wait_for_records(&h.store, 1).await;
        assert_eq!(h.store.votes(), vec!["dogs"]);
        assert!(h.queue.is_empty());
        assert_eq!(h.store_connector.attempts(), 2);
        assert_eq!(h.store_connector.disconnects(), 1);

        let report = h.stop().await;
        assert_eq!(report, WorkerReport { recorded: 1, dropped: 1 });
    }

    async fn wait_for_store_connection(store: &MemoryStore) {
        while !store.has_schema() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_store_unreachable() {
        let h = spawn_worker(0, usize::MAX);
        tokio::time::sleep(RETRY_DELAY * 4).await;

        let report = h.stop().await;
        assert_eq!(report, WorkerReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retry_delay() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let store_connector = MemoryConnector::new("store", store.clone()).failing(4);
        let (tx, shutdown) = Shutdown::new();
        let worker = TallyWorker::new(MemoryConnector::new("queue", queue.clone()), store_connector.clone(), shutdown)
            .with_retry_delay(Duration::from_secs(1));
        let handle = tokio::spawn(worker.run());

        let start = Instant::now();
        queue.push("dogs").await.unwrap();
        wait_for_records(&store, 1).await;
        assert!(start.elapsed() < RETRY_DELAY);
        assert_eq!(store_connector.attempts(), 5);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap().recorded, 1);
    }
}
