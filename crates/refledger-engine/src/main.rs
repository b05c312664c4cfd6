//! Refledger daemon: opens the store and runs the release scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refledger_engine::{
    EngineConfig, HttpProviderSync, NoopSync, ProviderSync, ReleaseScheduler,
};
use refledger_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,refledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting refledger");

    let config = EngineConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir,
        release_interval_seconds = config.release_interval_seconds,
        provider_configured = %config.provider_api_url.is_some(),
        max_levels = config.schedule.max_levels,
        "Engine configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let sync: Arc<dyn ProviderSync> =
        match (&config.provider_api_url, &config.provider_api_key) {
            (Some(url), Some(key)) => Arc::new(HttpProviderSync::new(url.clone(), key.clone())),
            _ => {
                tracing::info!("No provider configured, sync disabled");
                Arc::new(NoopSync)
            }
        };

    let scheduler = ReleaseScheduler::new(store, sync);
    tracing::info!("Release scheduler running");
    scheduler
        .run(Duration::from_secs(config.release_interval_seconds))
        .await;

    Ok(())
}
