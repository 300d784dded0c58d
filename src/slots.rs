//! Hardware slot lifecycle driven from catalog state
//!
//! Every change made on a device leaves an entry in that device's `events`
//! series.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::DeviceId;
use crate::actors::Coordinator;
use crate::catalog::{CatalogError, Device, EntityId, EntityKind, Slot};
use crate::error::HubResult;
use crate::protocol::{DeviceApi, NetConfig, SlotStatus};

#[derive(Clone)]
pub struct SlotController {
    coordinator: Coordinator,
}

impl SlotController {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    async fn connect(&self, device_id: DeviceId) -> HubResult<(Device, Arc<dyn DeviceApi>)> {
        let device = self.coordinator.catalog().device(device_id).await?;
        let api = self.coordinator.connector().api(&device.endpoint());
        Ok((device, api))
    }

    async fn audit(&self, device_id: DeviceId, description: String) {
        debug!("{description}");
        if let Err(e) = self.coordinator.on_event(device_id, &description).await {
            warn!("failed to record event for device {device_id}: {e}");
        }
    }

    /// Create the slot on the device with the scheme's preset, then store it
    #[instrument(skip(self))]
    pub async fn create(&self, device_id: DeviceId, slot_id: u8, scheme_id: EntityId) -> HubResult<Slot> {
        let (_, api) = self.connect(device_id).await?;
        let catalog = self.coordinator.catalog();

        if catalog.slot(device_id, slot_id).await.is_ok() {
            return Err(CatalogError::Conflict(format!("slot {slot_id} of device {device_id} exists")).into());
        }

        let scheme = catalog.scheme(scheme_id).await?;
        let preset = catalog.preset(scheme.preset_id).await?;

        api.create_slot(slot_id, &preset.wire_tracks()).await?;
        let slot = catalog
            .put_slot(Slot {
                device_id,
                slot_id,
                scheme_id: Some(scheme_id),
            })
            .await?;

        info!("created slot {slot_id} with scheme {}", scheme.name);
        self.audit(device_id, format!("slot {slot_id} created with scheme {}", scheme.name))
            .await;
        Ok(slot)
    }

    /// Remove the slot from the device, then from the catalog
    #[instrument(skip(self))]
    pub async fn delete(&self, device_id: DeviceId, slot_id: u8) -> HubResult<()> {
        let (_, api) = self.connect(device_id).await?;
        let catalog = self.coordinator.catalog();
        catalog.slot(device_id, slot_id).await?;

        api.remove_slot(slot_id).await?;
        catalog.remove_slot(device_id, slot_id).await?;

        self.audit(device_id, format!("slot {slot_id} deleted")).await;
        Ok(())
    }

    /// Start the slot with its scheme's sources and audio mapping
    #[instrument(skip(self))]
    pub async fn start(&self, device_id: DeviceId, slot_id: u8) -> HubResult<()> {
        let (_, api) = self.connect(device_id).await?;
        let catalog = self.coordinator.catalog();

        let slot = catalog.slot(device_id, slot_id).await?;
        let scheme_id = slot.scheme_id.ok_or_else(|| CatalogError::Validation {
            kind: EntityKind::Slot,
            reason: format!("slot {slot_id} has no scheme to start"),
        })?;
        let scheme = catalog.scheme(scheme_id).await?;
        let start = catalog.start_args(&scheme).await?;

        api.restart_slot(slot_id, &start).await?;

        self.audit(device_id, format!("slot {slot_id} started with scheme {}", scheme.name))
            .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, device_id: DeviceId, slot_id: u8) -> HubResult<()> {
        let (_, api) = self.connect(device_id).await?;
        self.coordinator.catalog().slot(device_id, slot_id).await?;

        api.stop_slot(slot_id).await?;

        self.audit(device_id, format!("slot {slot_id} stopped")).await;
        Ok(())
    }

    pub async fn status(&self, device_id: DeviceId, slot_id: u8) -> HubResult<SlotStatus> {
        let (_, api) = self.connect(device_id).await?;
        Ok(api.get_slot_status(slot_id).await?)
    }

    /// Any failure to get the status counts as not running
    pub async fn is_running(&self, device_id: DeviceId, slot_id: u8) -> bool {
        match self.status(device_id, slot_id).await {
            Ok(status) => status.is_running(),
            Err(e) => {
                debug!("status of slot {slot_id} unavailable: {e}");
                false
            }
        }
    }

    pub async fn save_config(&self, device_id: DeviceId) -> HubResult<()> {
        let (_, api) = self.connect(device_id).await?;
        api.save_config().await?;
        self.audit(device_id, "configuration saved".to_string()).await;
        Ok(())
    }

    pub async fn restart(&self, device_id: DeviceId) -> HubResult<()> {
        let (device, api) = self.connect(device_id).await?;
        api.restart().await?;
        info!("restarting {}", device.name);
        self.audit(device_id, "device restarted".to_string()).await;
        Ok(())
    }

    pub async fn net_config(&self, device_id: DeviceId) -> HubResult<NetConfig> {
        let (_, api) = self.connect(device_id).await?;
        Ok(api.get_net_config().await?)
    }
}
