use tokio::signal::{self, ctrl_c};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use crate::connection::Shutdown;

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

/// Spawns a task that fires the returned token on Ctrl+C or SIGTERM.
pub fn spawn_shutdown_listener() -> Shutdown {
    let (tx, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    shutdown
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
