use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use transcoder_hub::{
    actors::Coordinator,
    catalog::{Catalog, Device, MemoryCatalog},
    config::{Config, read_config_file},
    notify::notifier_from_config,
    protocol::TcpConnector,
    reconcile::SyncEngine,
    storage::open_store,
    util::get_config_path,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $TXHUB_CONFIG or ./txhub.json)
    #[arg(short)]
    file: Option<PathBuf>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("transcoder_hub", LevelFilter::DEBUG),
        ("txhub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args.file.unwrap_or_else(get_config_path);
    let config = read_config_file(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    let catalog = seed_catalog(&config).await?;
    let store = open_store(&config.storage)
        .await
        .context("failed to open metrics store")?;
    info!("metrics store: {}", store.get_stats().await?);

    let coordinator = Coordinator::new(
        catalog,
        store.clone(),
        notifier_from_config(config.alert.as_ref()),
        Arc::new(TcpConnector::new(
            config.protocol.timeout(),
            config.monitor.load_retries,
        )),
        config.monitor.clone(),
    );
    coordinator.start().await?;

    if config.sync_on_start {
        sync_devices(&coordinator).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    coordinator.shutdown().await;
    store.close().await?;

    Ok(())
}

async fn seed_catalog(config: &Config) -> anyhow::Result<Arc<dyn Catalog>> {
    let catalog = MemoryCatalog::new();
    for device in &config.devices {
        catalog
            .add_device(Device::from(device))
            .await
            .with_context(|| format!("invalid device {} in config", device.id))?;
    }
    Ok(Arc::new(catalog))
}

#[instrument(skip_all)]
async fn sync_devices(coordinator: &Coordinator) -> anyhow::Result<()> {
    let engine = SyncEngine::new(coordinator.clone());
    for (device_id, result) in engine.sync_all().await? {
        match result {
            Ok(report) if report.is_clean() => info!("device {device_id} synchronized"),
            Ok(report) => {
                for e in &report.errors {
                    warn!("device {device_id}: {e}");
                }
            }
            Err(e) => error!("device {device_id} not synchronized: {e}"),
        }
    }
    Ok(())
}
