use backend::{
    config::Config,
    connection::{connect_with_retry, RETRY_DELAY},
    server,
    store::PgConnector,
    telemetry,
};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();
    info!("🚀 Starting result service");

    let config = Config::load()?;
    let mut shutdown = telemetry::spawn_shutdown_listener();

    let connector = PgConnector::new(&config);
    let Some(store) = connect_with_retry(&connector, RETRY_DELAY, &mut shutdown).await else {
        info!("Shutdown requested before PostgreSQL became reachable");
        return Ok(());
    };

    server::results_service(config.figment(), store).launch().await?;
    Ok(())
}
