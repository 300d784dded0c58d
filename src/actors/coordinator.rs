//! Coordinator - Supervises one monitor actor per device plus the pruner
//!
//! The coordinator is constructed explicitly and shared by cloning; all
//! clones see the same actors. Membership changes go through one mutex,
//! and shutdown takes the actors out of the map before stopping them so
//! it never races with a concurrent add or remove.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::device_monitor::MonitorHandle;
use super::pruner::{PrunerHandle, prune_history};
use super::recorder::MonitorRecorder;
use crate::catalog::{Catalog, Device};
use crate::config::MonitorSettings;
use crate::error::HubResult;
use crate::notify::Notifier;
use crate::protocol::Connector;
use crate::storage::{Metric, MetricEntry, MetricsStore, Period, RangeQuery};
use crate::{DeviceId, LoadStatus};

struct MonitorEntry {
    handle: MonitorHandle,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    started: bool,
    monitors: HashMap<DeviceId, MonitorEntry>,
    pruner: Option<(PrunerHandle, JoinHandle<()>)>,
}

struct Inner {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn MetricsStore>,
    connector: Arc<dyn Connector>,
    recorder: Arc<MonitorRecorder>,
    settings: MonitorSettings,
    state: Mutex<State>,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn MetricsStore>,
        notifier: Arc<dyn Notifier>,
        connector: Arc<dyn Connector>,
        settings: MonitorSettings,
    ) -> Self {
        let recorder = Arc::new(MonitorRecorder::new(store.clone(), notifier, catalog.clone()));
        Self {
            inner: Arc::new(Inner {
                catalog,
                store,
                connector,
                recorder,
                settings,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.inner.connector
    }

    /// Spawn a monitor for every catalog device plus the pruner
    ///
    /// Calling `start` on a started coordinator does nothing.
    #[instrument(skip(self))]
    pub async fn start(&self) -> HubResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.started {
            debug!("coordinator already started");
            return Ok(());
        }

        let devices = self.inner.catalog.devices().await?;
        for device in &devices {
            let entry = self.spawn_monitor(device);
            state.monitors.insert(device.id, entry);
        }

        state.pruner = Some(PrunerHandle::spawn(
            self.inner.catalog.clone(),
            self.inner.store.clone(),
            self.inner.settings.retention,
            self.inner.settings.prune_period(),
        ));
        state.started = true;

        info!("monitoring {} devices", devices.len());
        Ok(())
    }

    /// Stop every actor and the pruner; safe to call when not started
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let (monitors, pruner) = {
            let mut state = self.inner.state.lock().await;
            if !state.started {
                return;
            }
            state.started = false;
            (std::mem::take(&mut state.monitors), state.pruner.take())
        };

        let count = monitors.len();
        let mut tasks = Vec::with_capacity(count + 1);
        for (device_id, entry) in monitors {
            if let Err(e) = entry.handle.shutdown().await {
                debug!("monitor of device {device_id} already gone: {e:#}");
            }
            tasks.push(entry.task);
        }
        if let Some((handle, task)) = pruner {
            if let Err(e) = handle.shutdown().await {
                debug!("pruner already gone: {e:#}");
            }
            tasks.push(task);
        }

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("actor ended abnormally: {e}");
            }
        }
        info!("stopped {count} device monitors");
    }

    pub async fn is_started(&self) -> bool {
        self.inner.state.lock().await.started
    }

    /// Start monitoring a catalog device
    ///
    /// No-op when the device is already monitored or the coordinator is not
    /// started. A monitor whose task died is replaced.
    #[instrument(skip(self))]
    pub async fn add_device(&self, device_id: DeviceId) -> HubResult<()> {
        let mut state = self.inner.state.lock().await;
        if !state.started {
            debug!("coordinator not started, not monitoring device {device_id}");
            return Ok(());
        }
        if let Some(entry) = state.monitors.get(&device_id) {
            if entry.handle.is_running() {
                return Ok(());
            }
            warn!("monitor of device {device_id} died, restarting it");
        }

        let device = self.inner.catalog.device(device_id).await?;
        let entry = self.spawn_monitor(&device);
        state.monitors.insert(device_id, entry);
        Ok(())
    }

    /// Stop monitoring a device; its history is kept
    ///
    /// Returns whether a monitor was running.
    #[instrument(skip(self))]
    pub async fn remove_device(&self, device_id: DeviceId) -> bool {
        let entry = self.inner.state.lock().await.monitors.remove(&device_id);
        let Some(entry) = entry else {
            return false;
        };

        if let Err(e) = entry.handle.shutdown().await {
            debug!("monitor of device {device_id} already gone: {e:#}");
        }
        if let Err(e) = entry.task.await {
            warn!("monitor of device {device_id} ended abnormally: {e}");
        }
        true
    }

    /// Handle of a running monitor
    pub async fn monitor(&self, device_id: DeviceId) -> Option<MonitorHandle> {
        self.inner
            .state
            .lock()
            .await
            .monitors
            .get(&device_id)
            .map(|entry| entry.handle.clone())
    }

    pub async fn monitored_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.inner.state.lock().await.monitors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn spawn_monitor(&self, device: &Device) -> MonitorEntry {
        debug!("spawning monitor for device {} ({})", device.id, device.name);
        let (handle, task) = MonitorHandle::spawn(
            device.id,
            device.name.clone(),
            self.inner.connector.probe(&device.endpoint()),
            self.inner.recorder.clone(),
            &self.inner.settings,
        );
        MonitorEntry { handle, task }
    }

    pub async fn on_state_changed(&self, device_id: DeviceId, alive: bool) -> HubResult<()> {
        self.inner.recorder.state_changed(device_id, alive).await
    }

    pub async fn on_wakeup_state(&self, device_id: DeviceId, alive: bool) -> HubResult<()> {
        self.inner.recorder.wakeup_state(device_id, alive).await
    }

    pub async fn on_load_status(&self, device_id: DeviceId, status: &LoadStatus) -> HubResult<()> {
        self.inner.recorder.load_status(device_id, status).await
    }

    /// Leave an audit entry in the device's `events` series
    pub async fn on_event(&self, device_id: DeviceId, description: &str) -> HubResult<()> {
        self.inner.recorder.event(device_id, description).await
    }

    pub async fn get_metric(
        &self,
        device_id: DeviceId,
        metric: Metric,
        period: Period,
        reverse: bool,
        limit: Option<usize>,
    ) -> HubResult<Vec<MetricEntry>> {
        let query = RangeQuery::for_period(device_id, metric, period, Utc::now())
            .reverse(reverse)
            .limit(limit);
        Ok(self.inner.store.range(query).await?)
    }

    /// One series per core that has readings in the period
    pub async fn get_temperatures(
        &self,
        device_id: DeviceId,
        period: Period,
        reverse: bool,
        limit: Option<usize>,
    ) -> HubResult<BTreeMap<u8, Vec<MetricEntry>>> {
        let mut series = BTreeMap::new();
        for metric in Metric::temperatures() {
            let Metric::Temp(core) = metric else {
                continue;
            };
            let entries = self.get_metric(device_id, metric, period, reverse, limit).await?;
            if !entries.is_empty() {
                series.insert(core, entries);
            }
        }
        Ok(series)
    }

    /// Delete all stored history of a device
    pub async fn purge_history(&self, device_id: DeviceId) -> HubResult<()> {
        Ok(self.inner.store.delete_all(device_id).await?)
    }

    /// Prune all series of all catalog devices older than `period`
    pub async fn prune_all(&self, period: Period) -> HubResult<usize> {
        prune_history(
            self.inner.catalog.as_ref(),
            self.inner.store.as_ref(),
            period,
            Utc::now(),
        )
        .await
    }
}
