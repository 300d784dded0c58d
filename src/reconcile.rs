//! Configuration sync: align catalog slots with what a device reports
//!
//! A sync run on one device:
//!
//! 1. gives up with no changes if the device does not answer,
//! 2. drops catalog slots the device no longer has and adds bare slots for
//!    ones it has but the catalog lacks,
//! 3. binds every running slot to a scheme matching its live preset,
//!    sources and audio mapping, creating placeholder entities as needed.
//!
//! Per-slot failures are collected in the report and do not stop the run.
//! Runs on the same device are serialized.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::DeviceId;
use crate::actors::Coordinator;
use crate::catalog::{EntityId, Resolver, Slot};
use crate::error::{HubError, HubResult};
use crate::protocol::{DeviceApi, SlotStatus, WireTrack};

pub const SYNC_EVENT: &str = "configuration synchronized";

/// What one sync run changed
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Slot ids deleted from the catalog
    pub removed: Vec<u8>,

    /// Slot ids added to the catalog without a scheme
    pub created: Vec<u8>,

    /// Running slots and the scheme they are bound to now
    pub bound: Vec<(u8, EntityId)>,

    pub errors: Vec<HubError>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct SyncEngine {
    coordinator: Coordinator,
    resolver: Resolver,
    locks: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(coordinator: Coordinator) -> Self {
        let resolver = Resolver::new(coordinator.catalog().clone());
        Self {
            coordinator,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn device_lock(&self, device_id: DeviceId) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(device_id).or_default().clone()
    }

    /// Sync every catalog device, one after another
    pub async fn sync_all(&self) -> HubResult<Vec<(DeviceId, HubResult<SyncReport>)>> {
        let mut results = Vec::new();
        for device in self.coordinator.catalog().devices().await? {
            results.push((device.id, self.sync(device.id).await));
        }
        Ok(results)
    }

    #[instrument(skip(self))]
    pub async fn sync(&self, device_id: DeviceId) -> HubResult<SyncReport> {
        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        let catalog = self.coordinator.catalog();
        let device = catalog.device(device_id).await?;
        info!("synchronizing {} @ {}", device.name, device.host);

        let api = self.coordinator.connector().api(&device.endpoint());
        if !api.is_alive().await {
            warn!("device is not responding");
            return Err(HubError::DeviceUnreachable(device_id));
        }

        let live: BTreeSet<u8> = api.get_slots().await?.into_iter().collect();
        let configured = catalog.slots(device_id).await?;

        if live.len() == configured.len() {
            info!("slot count matches, {} slots", live.len());
        } else {
            warn!(
                "slot count mismatch: {} on device, {} in configuration",
                live.len(),
                configured.len()
            );
        }

        let mut report = SyncReport::default();
        let known: BTreeSet<u8> = configured.iter().map(|slot| slot.slot_id).collect();

        for slot_id in known.difference(&live) {
            info!("removing slot {slot_id}, it is not present on the device");
            match catalog.remove_slot(device_id, *slot_id).await {
                Ok(()) => report.removed.push(*slot_id),
                Err(e) => report.errors.push(slot_error(*slot_id, e.into())),
            }
        }

        for slot_id in live.difference(&known) {
            info!("slot {slot_id} not in configuration, creating it");
            match catalog.put_slot(Slot::bare(device_id, *slot_id)).await {
                Ok(_) => report.created.push(*slot_id),
                Err(e) => report.errors.push(slot_error(*slot_id, e.into())),
            }
        }

        for slot_id in &live {
            match self.sync_slot(api.as_ref(), device_id, *slot_id).await {
                Ok(Some(scheme_id)) => report.bound.push((*slot_id, scheme_id)),
                Ok(None) => {}
                Err(e) => {
                    error!("failed to synchronize slot {slot_id}: {e}");
                    report.errors.push(slot_error(*slot_id, e));
                }
            }
        }

        if let Err(e) = self.coordinator.on_event(device_id, SYNC_EVENT).await {
            warn!("failed to record sync event: {e}");
        }

        info!(
            "synchronization finished: {} removed, {} created, {} bound, {} errors",
            report.removed.len(),
            report.created.len(),
            report.bound.len(),
            report.errors.len()
        );
        Ok(report)
    }

    async fn sync_slot(
        &self,
        api: &dyn DeviceApi,
        device_id: DeviceId,
        slot_id: u8,
    ) -> HubResult<Option<EntityId>> {
        debug!("synchronizing slot {slot_id}");
        let tracks = api.get_slot(slot_id).await?;
        let status = api.get_slot_status(slot_id).await?;

        let running = match status {
            SlotStatus::Stopped => {
                self.report_stopped(device_id, slot_id, &tracks).await?;
                return Ok(None);
            }
            SlotStatus::Running(running) => running,
        };

        let scheme = self.resolver.resolve_scheme(&tracks, &running).await?;

        let catalog = self.coordinator.catalog();
        let mut slot = catalog.slot(device_id, slot_id).await?;
        if slot.scheme_id != Some(scheme.id) {
            slot.scheme_id = Some(scheme.id);
            catalog.put_slot(slot).await?;
        }
        info!("slot {slot_id} bound to scheme {}", scheme.name);

        Ok(Some(scheme.id))
    }

    /// A stopped slot keeps its binding; only say whether it still fits
    async fn report_stopped(&self, device_id: DeviceId, slot_id: u8, tracks: &[WireTrack]) -> HubResult<()> {
        let catalog = self.coordinator.catalog();
        let slot = catalog.slot(device_id, slot_id).await?;

        let Some(scheme_id) = slot.scheme_id else {
            info!("slot {slot_id} is stopped and has no scheme, cannot match one");
            return Ok(());
        };

        let scheme = catalog.scheme(scheme_id).await?;
        let preset = catalog.preset(scheme.preset_id).await?;
        if preset.has_tracks(tracks) {
            info!("slot {slot_id} is stopped, bound preset {} matches the device", preset.name);
        } else {
            info!("slot {slot_id} is stopped, bound preset {} differs from the device", preset.name);
        }
        Ok(())
    }
}

fn slot_error(slot_id: u8, error: HubError) -> HubError {
    HubError::Reconciliation {
        slot_id,
        reason: error.to_string(),
    }
}
