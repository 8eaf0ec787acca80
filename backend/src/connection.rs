use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::StoreError;

/// Fixed wait between reconnect attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Queue connection failed: {0}")]
    Queue(#[from] redis::RedisError),
    #[error("Store connection failed: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Schema setup failed: {0}")]
    Schema(#[from] StoreError),
    #[error("{0} is unreachable")]
    Unreachable(&'static str),
}

/// Cancellation token shared by every blocking wait in a process.
///
/// Fires when the sender publishes `true` or is dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    fired: bool,
}

impl Shutdown {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx, fired: false })
    }

    pub fn is_triggered(&self) -> bool {
        self.fired || *self.rx.borrow()
    }

    pub async fn wait(&mut self) {
        if !self.is_triggered() {
            while self.rx.changed().await.is_ok() {
                if *self.rx.borrow_and_update() {
                    break;
                }
            }
        }
        self.fired = true;
    }

    /// Sleeps for `delay`. Returns `false` if shutdown fired first.
    pub async fn sleep(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.wait() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Opens connections to one external service.
#[rocket::async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send + Sync;

    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<Self::Connection, ConnectError>;

    /// Runs once on every fresh connection before it is handed out.
    async fn prepare(&self, _conn: &Self::Connection) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn disconnect(&self, _conn: Self::Connection) {}
}

/// Connects, retrying forever with a fixed delay. `None` means shutdown fired first.
pub async fn connect_with_retry<C: Connector>(
    connector: &C,
    delay: Duration,
    shutdown: &mut Shutdown,
) -> Option<C::Connection> {
    loop {
        if shutdown.is_triggered() {
            return None;
        }

        let attempt = tokio::select! {
            biased;
            _ = shutdown.wait() => return None,
            attempt = connector.connect() => attempt,
        };

        let error = match attempt {
            Ok(conn) => match connector.prepare(&conn).await {
                Ok(()) => {
                    info!("Connected to {}", connector.name());
                    return Some(conn);
                }
                Err(e) => {
                    connector.disconnect(conn).await;
                    e
                }
            },
            Err(e) => e,
        };

        warn!("Could not connect to {}: {}", connector.name(), error);
        warn!("Retrying in {} seconds...", delay.as_secs_f32());
        if !shutdown.sleep(delay).await {
            return None;
        }
    }
}

/// Owns a single replaceable connection handle.
///
/// `acquire` reconnects (with retry) whenever the handle has been invalidated.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    handle: Option<C::Connection>,
    retry_delay: Duration,
    shutdown: Shutdown,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, shutdown: Shutdown) -> Self {
        Self {
            connector,
            handle: None,
            retry_delay: RETRY_DELAY,
            shutdown,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub async fn acquire(&mut self) -> Option<&C::Connection> {
        if self.handle.is_none() {
            self.handle = connect_with_retry(&self.connector, self.retry_delay, &mut self.shutdown).await;
        }
        self.handle.as_ref()
    }

    pub async fn invalidate(&mut self) {
        if let Some(conn) = self.handle.take() {
            debug!("Closing {} connection", self.connector.name());
            self.connector.disconnect(conn).await;
        }
    }
}
