use backend::{
    config::Config,
    connection::{connect_with_retry, RETRY_DELAY},
    queue::{ManagedRedisConnector, QUEUE_URL},
    server, telemetry,
};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();
    info!("🚀 Starting poll service");

    let config = Config::load()?;
    let mut shutdown = telemetry::spawn_shutdown_listener();

    let connector = ManagedRedisConnector::new(QUEUE_URL)?;
    let Some(queue) = connect_with_retry(&connector, RETRY_DELAY, &mut shutdown).await else {
        info!("Shutdown requested before Redis became reachable");
        return Ok(());
    };

    server::intake_service(config.figment(), queue).launch().await?;
    Ok(())
}
