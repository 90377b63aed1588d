//! Ticketline - Main Entry Point
//! Wires SQLite storage, the queue services and the JSON-RPC server.

mod config;

use anyhow::{Context, Result};
use config::{DaemonConfig, LogFormat};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ticketline_api_rpc::{RpcServer, RpcServerConfig};
use ticketline_core::application::{QueueService, QueueStore, RetryBudget, SubscriptionBroker};
use ticketline_core::port::id_provider::UuidProvider;
use ticketline_core::port::time_provider::SystemTimeProvider;
use ticketline_infra_sqlite::{create_pool, run_migrations, SqliteQueueRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "ticketline=info";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);
    info!(version = VERSION, "Ticketline starting");

    // 2. Database
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create data directory {}", dir.display()))?;
    }
    let db_url = config.db_path.to_string_lossy().into_owned();
    info!(db_path = %db_url, "Opening database");

    let pool = create_pool(&db_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Wiring
    let repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
    let broker = Arc::new(SubscriptionBroker::new());
    let budget = RetryBudget::with_max_attempts(config.retry_attempts)
        .context("Invalid retry budget")?;
    let store = Arc::new(QueueStore::new(
        repo,
        broker,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        budget,
    ));
    let loaded = store.prime().await.context("Loading queues failed")?;
    info!(queues = loaded, "Queue state loaded");
    let service = Arc::new(QueueService::new(store));

    // 4. JSON-RPC server
    if config.admin_token.is_none() {
        warn!("TICKETLINE_ADMIN_TOKEN not set: admin methods are disabled");
    }
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
        admin_token: config.admin_token.clone(),
    };
    let (addr, rpc_handle) = RpcServer::new(rpc_config, service)
        .start()
        .await
        .context("RPC server start failed")?;

    info!(addr = %addr, "Ready. Press Ctrl+C to shut down");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    if tokio::time::timeout(SHUTDOWN_GRACE, rpc_handle.stopped())
        .await
        .is_err()
    {
        warn!("RPC server did not stop within the grace period");
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
