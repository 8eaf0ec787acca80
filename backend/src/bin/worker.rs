use backend::{
    config::Config,
    queue::{RedisConnector, QUEUE_URL},
    store::PgConnector,
    telemetry,
    worker::TallyWorker,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();
    info!("🚀 Starting tally worker");

    let config = Config::load()?;
    let shutdown = telemetry::spawn_shutdown_listener();

    let queue = RedisConnector::new(QUEUE_URL)?;
    let store = PgConnector::new(&config);
    let report = TallyWorker::new(queue, store, shutdown).run().await;

    info!("📋 Recorded {} votes, dropped {}", report.recorded, report.dropped);
    Ok(())
}
