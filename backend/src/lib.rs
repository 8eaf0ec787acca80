pub mod catchers;
pub mod config;
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod queue;
pub mod routes;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod worker;
