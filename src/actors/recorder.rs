//! Persists monitor observations and decides when to alert
//!
//! Every state reading ends up in the `state` series. A confirmed change
//! always alerts; a wakeup reading only alerts when it differs from the
//! last stored state, so a restart of the hub does not re-announce devices
//! that are still in the state they were in.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::device_monitor::MonitorListener;
use crate::catalog::Catalog;
use crate::error::HubResult;
use crate::notify::Notifier;
use crate::storage::{Metric, MetricValue, MetricsStore, Period, RangeQuery};
use crate::{DeviceId, LoadStatus, state_label};

pub struct MonitorRecorder {
    store: Arc<dyn MetricsStore>,
    notifier: Arc<dyn Notifier>,
    catalog: Arc<dyn Catalog>,
}

impl MonitorRecorder {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        notifier: Arc<dyn Notifier>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
        }
    }

    async fn device_name(&self, device_id: DeviceId) -> String {
        match self.catalog.device(device_id).await {
            Ok(device) => device.name,
            Err(_) => format!("device {device_id}"),
        }
    }

    /// Most recent value of the `state` series
    pub async fn last_state(&self, device_id: DeviceId) -> HubResult<Option<bool>> {
        let query = RangeQuery::for_period(device_id, Metric::State, Period::All, Utc::now())
            .reverse(true)
            .limit(Some(1));
        let latest = self.store.range(query).await?;
        Ok(latest.first().and_then(|entry| entry.value.as_state()))
    }

    #[instrument(skip(self))]
    pub async fn state_changed(&self, device_id: DeviceId, alive: bool) -> HubResult<()> {
        self.store
            .append(device_id, Metric::State, Utc::now(), MetricValue::State(alive))
            .await?;

        let name = self.device_name(device_id).await;
        info!("{name} is now {}", state_label(alive));
        self.notifier.notify_state_change(device_id, &name, alive).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn wakeup_state(&self, device_id: DeviceId, alive: bool) -> HubResult<()> {
        let previous = self.last_state(device_id).await?;

        self.store
            .append(device_id, Metric::State, Utc::now(), MetricValue::State(alive))
            .await?;

        match previous {
            Some(previous) if previous != alive => {
                let name = self.device_name(device_id).await;
                info!("{name} woke up {} (was {})", state_label(alive), state_label(previous));
                self.notifier.notify_state_change(device_id, &name, alive).await;
            }
            Some(_) => debug!("woke up in the stored state {}", state_label(alive)),
            None => debug!("first state reading: {}", state_label(alive)),
        }
        Ok(())
    }

    pub async fn load_status(&self, device_id: DeviceId, status: &LoadStatus) -> HubResult<()> {
        self.load_status_at(device_id, status, Utc::now()).await
    }

    async fn load_status_at(
        &self,
        device_id: DeviceId,
        status: &LoadStatus,
        timestamp: DateTime<Utc>,
    ) -> HubResult<()> {
        self.store
            .append(device_id, Metric::Cpu, timestamp, MetricValue::Number(status.cpu))
            .await?;

        for (core, temperature) in &status.temperatures {
            let Some(metric) = Metric::temp(*core) else {
                warn!("device {device_id} reported temperature for unsupported core {core}");
                continue;
            };
            self.store
                .append(device_id, metric, timestamp, MetricValue::Number(*temperature))
                .await?;
        }
        Ok(())
    }

    pub async fn event(&self, device_id: DeviceId, description: &str) -> HubResult<()> {
        self.store
            .append(
                device_id,
                Metric::Events,
                Utc::now(),
                MetricValue::Event(description.to_string()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MonitorListener for MonitorRecorder {
    async fn on_wakeup_state(&self, device_id: DeviceId, alive: bool) {
        if let Err(e) = self.wakeup_state(device_id, alive).await {
            error!("failed to record wakeup state of device {device_id}: {e}");
        }
    }

    async fn on_state_changed(&self, device_id: DeviceId, alive: bool) {
        if let Err(e) = self.state_changed(device_id, alive).await {
            error!("failed to record state change of device {device_id}: {e}");
        }
    }

    async fn on_load_status(&self, device_id: DeviceId, status: LoadStatus) {
        if let Err(e) = self.load_status(device_id, &status).await {
            error!("failed to record load status of device {device_id}: {e}");
        }
    }
}
