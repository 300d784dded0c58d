//! HistoryPruner - Drops metric entries that fell out of the retention window
//!
//! One pass walks every device in the catalog and every fixed metric name.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::PrunerCommand;
use crate::catalog::Catalog;
use crate::error::HubResult;
use crate::storage::{Metric, MetricsStore, Period};

/// Prune every series of every catalog device older than `retention`
///
/// Returns the number of deleted entries. `Period::All` keeps everything.
pub async fn prune_history(
    catalog: &dyn Catalog,
    store: &dyn MetricsStore,
    retention: Period,
    now: DateTime<Utc>,
) -> HubResult<usize> {
    let Some(cutoff) = retention.cutoff(now) else {
        trace!("retention is unlimited, nothing to prune");
        return Ok(0);
    };

    let mut deleted = 0;
    for device in catalog.devices().await? {
        for metric in Metric::all() {
            deleted += store.prune(device.id, metric, cutoff).await?;
        }
    }

    if deleted > 0 {
        info!("pruned {deleted} metric entries older than {cutoff}");
    }
    Ok(deleted)
}

pub struct HistoryPruner {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn MetricsStore>,
    retention: Period,
    period: Duration,
    command_rx: mpsc::Receiver<PrunerCommand>,
}

impl HistoryPruner {
    #[instrument(skip(self), fields(retention = ?self.retention))]
    pub async fn run(mut self) {
        debug!("starting history pruner");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Don't crash the pruner - the next tick retries
                    if let Err(e) = self.prune().await {
                        error!("failed to prune history: {e}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    match cmd {
                        PrunerCommand::PruneNow { respond_to } => {
                            let _ = respond_to.send(self.prune().await.map_err(anyhow::Error::from));
                        }
                        PrunerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("history pruner stopped");
    }

    async fn prune(&self) -> HubResult<usize> {
        prune_history(self.catalog.as_ref(), self.store.as_ref(), self.retention, Utc::now()).await
    }
}

/// Handle for controlling the HistoryPruner
#[derive(Clone)]
pub struct PrunerHandle {
    sender: mpsc::Sender<PrunerCommand>,
}

impl PrunerHandle {
    pub fn spawn(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn MetricsStore>,
        retention: Period,
        period: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let pruner = HistoryPruner {
            catalog,
            store,
            retention,
            period,
            command_rx: cmd_rx,
        };
        let task = tokio::spawn(pruner.run());
        (Self { sender: cmd_tx }, task)
    }

    pub async fn prune_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PrunerCommand::PruneNow { respond_to: tx })
            .await
            .context("failed to send PruneNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PrunerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
