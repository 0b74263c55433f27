//! Valinfra - validator infrastructure lifecycle service
//!
//! Runs the driver event subscriber, the cron reconciler and the health
//! endpoints in one process, sharing a single store and bus connection.
//!
//! # Configuration
//!
//! - `LISTEN_ADDR`, `DATA_DIR`, `EVENT_INBOX`, `NETWORK_CONFIG_PATH`, `RESUBSCRIBE_DELAY_MS`
//! - `RABBITMQ_USERNAME`, `RABBITMQ_PASSWORD`, `RABBITMQ_HOST`, `RABBITMQ_PORT`,
//!   `RABBITMQ_EXCHANGE_NAME`, `RABBITMQ_PREFETCH`, `RABBITMQ_CONNECT_ATTEMPTS`, see `BusConfig::from_env`
//! - `RECONCILE_PERIOD_SECONDS`
//! - `CHAIN_TIMEOUT_SECONDS`, see `ControlConfig::from_env`

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use valinfra_bus::{AmqpBus, BusConfig, CommandBus};
use valinfra_control::{event_router, ControlConfig, ControlPlaneService};
use valinfra_reconciler::{Reconciler, ReconcilerConfig};
use valinfra_service::{
    create_router, load_network_configs, seed_network_configs, wait_for_shutdown, EventSubscriber,
    ServiceConfig, ServiceState,
};
use valinfra_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,valinfra=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting valinfra");

    let config = ServiceConfig::from_env();
    let bus_config = BusConfig::from_env();
    let control_config = ControlConfig::from_env();
    let reconciler_config = ReconcilerConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        event_inbox = %config.event_inbox,
        network_config_path = ?config.network_config_path,
        reconcile_period_secs = reconciler_config.period.as_secs(),
        "Service configuration loaded"
    );

    tracing::info!(path = %config.data_dir.display(), "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    if let Some(path) = &config.network_config_path {
        let configs = load_network_configs(path)?;
        let seeded = seed_network_configs(store.as_ref(), &configs)?;
        tracing::info!(count = seeded, "Network configurations seeded");
    } else {
        tracing::warn!("No NETWORK_CONFIG_PATH set - using network configurations already stored");
    }

    let bus = Arc::new(AmqpBus::connect(bus_config).await?);
    let control = Arc::new(ControlPlaneService::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        control_config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = ServiceState::new(Arc::clone(&store));

    // Event subscriber
    let subscriber = EventSubscriber::new(
        Arc::clone(&bus),
        event_router(&control),
        config.event_inbox.clone(),
        state.clone(),
    )
    .with_retry_delay(config.resubscribe_delay);
    let subscriber = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { subscriber.run(shutdown).await }
    });

    // Reconciler
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&bus), reconciler_config);
    let reconciler = tokio::spawn({
        let shutdown = wait_for_shutdown(shutdown_rx);
        async move { reconciler.run(shutdown).await }
    });

    // Health endpoints
    let app = create_router(state.clone());
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(ctrl_c())
        .await?;

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = subscriber.await {
        tracing::error!(error = %e, "Event subscriber task failed");
    }
    if let Err(e) = reconciler.await {
        tracing::error!(error = %e, "Reconciler task failed");
    }

    bus.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
}
