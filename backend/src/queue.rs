//! Redis-backed vote queue.
//!
//! Producers `LPUSH` onto the `votes` list and the single consumer `BRPOP`s
//! from the other end, so items come out in the order they went in. There is
//! no acknowledgement: a popped item is gone.

use redis::{
    aio::{ConnectionLike, ConnectionManager as RedisManager, MultiplexedConnection},
    AsyncCommands, Client, RedisError,
};
use thiserror::Error;

use crate::connection::{ConnectError, Connector};

pub const QUEUE_KEY: &str = "votes";
pub const QUEUE_URL: &str = "redis://redis:6379/0";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue connection lost: {0}")]
    Unavailable(String),
    #[error("Queue command failed: {0}")]
    Command(String),
}

impl From<RedisError> for QueueError {
    fn from(e: RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            QueueError::Unavailable(e.to_string())
        } else {
            QueueError::Command(e.to_string())
        }
    }
}

#[rocket::async_trait]
pub trait VoteQueue: Send + Sync {
    /// Appends a vote without waiting for a consumer.
    async fn push(&self, vote: &str) -> Result<(), QueueError>;

    /// Removes the oldest vote, waiting as long as it takes for one to arrive.
    async fn pop(&self) -> Result<String, QueueError>;
}

#[derive(Clone)]
pub struct RedisQueue<C = MultiplexedConnection> {
    conn: C,
}

impl<C> RedisQueue<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

#[rocket::async_trait]
impl<C> VoteQueue for RedisQueue<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn push(&self, vote: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(QUEUE_KEY, vote).await?;
        Ok(())
    }

    async fn pop(&self) -> Result<String, QueueError> {
        let mut conn = self.conn.clone();
        // Timeout 0 blocks until an item shows up.
        let (_list, vote): (String, String) = conn.brpop(QUEUE_KEY, 0.0).await?;
        Ok(vote)
    }
}

/// Dedicated connection for the blocking consumer. A dropped connection is not
/// repaired in place; the owner invalidates it and connects again.
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    pub fn new(url: &str) -> Result<Self, RedisError> {
        Ok(Self { client: Client::open(url)? })
    }
}

#[rocket::async_trait]
impl Connector for RedisConnector {
    type Connection = RedisQueue<MultiplexedConnection>;

    fn name(&self) -> &'static str {
        "Redis"
    }

    async fn connect(&self) -> Result<Self::Connection, ConnectError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(RedisQueue::new(conn))
    }
}

/// Producer-side connection that reconnects on its own after the first
/// successful connect.
pub struct ManagedRedisConnector {
    client: Client,
}

impl ManagedRedisConnector {
    pub fn new(url: &str) -> Result<Self, RedisError> {
        Ok(Self { client: Client::open(url)? })
    }
}

#[rocket::async_trait]
impl Connector for ManagedRedisConnector {
    type Connection = RedisQueue<RedisManager>;

    fn name(&self) -> &'static str {
        "Redis"
    }

    async fn connect(&self) -> Result<Self::Connection, ConnectError> {
        let manager = self.client.get_connection_manager().await?;
        Ok(RedisQueue::new(manager))
    }
}
