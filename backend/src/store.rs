use shared::models::{TallySnapshot, VoteRecord};
use sqlx::{
    postgres::{PgConnectOptions, PgConnection},
    ConnectOptions, Connection,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    config::Config,
    connection::{ConnectError, Connector},
};

pub const STORE_HOST: &str = "db";

const CREATE_VOTES_TABLE: &str = "CREATE TABLE IF NOT EXISTS votes (
    id SERIAL PRIMARY KEY,
    vote VARCHAR(255) NOT NULL
)";
const INSERT_VOTE: &str = "INSERT INTO votes (vote) VALUES ($1) RETURNING id";
const COUNT_VOTES: &str = "SELECT vote, COUNT(id) AS count FROM votes GROUP BY vote";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store lock poisoned")]
    LockFailed,
    #[error("Store unavailable")]
    Unavailable,
}

#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Creates the vote table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Inserts and commits one ballot.
    async fn record_vote(&self, vote: &str) -> Result<VoteRecord, StoreError>;

    /// Grouped `(vote, count)` rows, one per distinct vote value.
    async fn count_by_vote(&self) -> Result<Vec<(String, i64)>, StoreError>;

    async fn tally(&self) -> Result<TallySnapshot, StoreError> {
        Ok(TallySnapshot::from_counts(self.count_by_vote().await?))
    }
}

/// One long-lived Postgres connection. The mutex only serializes the
/// concurrent Rocket handlers that share it.
pub struct PgStore {
    conn: Mutex<PgConnection>,
}

impl PgStore {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.into_inner().close().await {
            debug!("Error while closing store connection: {}", e);
        }
    }
}

#[rocket::async_trait]
impl VoteStore for PgStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        sqlx::query(CREATE_VOTES_TABLE).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_vote(&self, vote: &str) -> Result<VoteRecord, StoreError> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        let id: i32 = sqlx::query_scalar(INSERT_VOTE)
            .bind(vote)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(VoteRecord { id, vote: vote.to_string() })
    }

    async fn count_by_vote(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String, i64)> = sqlx::query_as(COUNT_VOTES)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}

pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    /// Host is fixed; database name and credentials come from the environment
    /// and fall back to the driver defaults when unset.
    pub fn new(config: &Config) -> Self {
        let mut options = PgConnectOptions::new().host(STORE_HOST);
        if let Some(database) = &config.postgres_db {
            options = options.database(database);
        }
        if let Some(user) = &config.postgres_user {
            options = options.username(user);
        }
        if let Some(password) = &config.postgres_password {
            options = options.password(password);
        }
        Self { options }
    }
}

#[rocket::async_trait]
impl Connector for PgConnector {
    type Connection = PgStore;

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn connect(&self) -> Result<Self::Connection, ConnectError> {
        let conn = self.options.connect().await?;
        Ok(PgStore::new(conn))
    }

    async fn disconnect(&self, conn: Self::Connection) {
        conn.close().await;
    }
}

/// Wraps a store connector so every fresh connection has the vote table in place.
pub struct SchemaConnector<C>(pub C);

#[rocket::async_trait]
impl<C> Connector for SchemaConnector<C>
where
    C: Connector,
    C::Connection: VoteStore,
{
    type Connection = C::Connection;

    fn name(&self) -> &'static str {
        self.0.name()
    }

    async fn connect(&self) -> Result<Self::Connection, ConnectError> {
        self.0.connect().await
    }

    async fn prepare(&self, conn: &Self::Connection) -> Result<(), ConnectError> {
        self.0.prepare(conn).await?;
        conn.ensure_schema().await?;
        Ok(())
    }

    async fn disconnect(&self, conn: Self::Connection) {
        self.0.disconnect(conn).await
    }
}
