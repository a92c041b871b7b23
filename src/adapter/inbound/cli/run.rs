//! Handler for the `run` command.

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use crate::adapter::inbound::cli::command::RunArgs;
use crate::adapter::outbound::WebSocketConnector;
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::infrastructure::pool::ConnectionPool;

/// Execute the run command.
///
/// Opens the pool against `upstream.url` and keeps it running until Ctrl-C,
/// then shuts it down cleanly.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the upstream URL is
/// missing, or the pool cannot be created.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    config.init_logging();

    let connector = WebSocketConnector::from_config(&config)?;
    let pool = ConnectionPool::new(config.pool_settings(), Arc::new(connector.clone()))?;

    info!(
        url = %connector.url(),
        pool = pool.name(),
        min_connections = config.pool.min_connections,
        max_connections = config.pool.max_connections,
        "wsmux starting"
    );
    pool.initialize().await?;

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let snapshot = pool.stats();
    info!(
        active = snapshot.active_connections,
        created = snapshot.counters.connections_created,
        errors = snapshot.counters.connection_errors,
        "Final pool stats"
    );
    pool.shutdown().await;

    info!("wsmux stopped");
    Ok(())
}
