//! In-process catalog
//!
//! Used by the hub binary (seeded from the config file) and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::Catalog;
use super::error::{CatalogError, CatalogResult};
use super::model::{Capture, Device, EntityId, EntityKind, Preset, Scheme, Slot, Source};
use crate::DeviceId;

struct Inner {
    devices: BTreeMap<DeviceId, Device>,
    slots: BTreeMap<(DeviceId, u8), Slot>,
    captures: BTreeMap<EntityId, Capture>,
    sources: BTreeMap<EntityId, Source>,
    presets: BTreeMap<EntityId, Preset>,
    schemes: BTreeMap<EntityId, Scheme>,
    next_id: EntityId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
            slots: BTreeMap::new(),
            captures: BTreeMap::new(),
            sources: BTreeMap::new(),
            presets: BTreeMap::new(),
            schemes: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl Inner {
    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn lookup<T: Clone>(map: &BTreeMap<EntityId, T>, kind: EntityKind, id: EntityId) -> CatalogResult<T> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| CatalogError::not_found(kind, id))
}

fn ensure_unique_name<'a>(
    kind: EntityKind,
    name: &str,
    mut existing: impl Iterator<Item = (EntityId, &'a str)>,
    own_id: Option<EntityId>,
) -> CatalogResult<()> {
    if existing.any(|(id, other)| other == name && Some(id) != own_id) {
        return Err(CatalogError::Conflict(format!("{kind} name {name:?} is taken")));
    }
    Ok(())
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: RwLock<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn devices(&self) -> CatalogResult<Vec<Device>> {
        Ok(self.inner.read().await.devices.values().cloned().collect())
    }

    async fn device(&self, id: DeviceId) -> CatalogResult<Device> {
        lookup(&self.inner.read().await.devices, EntityKind::Device, id)
    }

    async fn add_device(&self, device: Device) -> CatalogResult<Device> {
        device.validate()?;
        let mut inner = self.inner.write().await;
        if inner.devices.contains_key(&device.id) {
            return Err(CatalogError::Conflict(format!("device {} already exists", device.id)));
        }
        ensure_unique_name(
            EntityKind::Device,
            &device.name,
            inner.devices.values().map(|d| (d.id, d.name.as_str())),
            None,
        )?;
        inner.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn remove_device(&self, id: DeviceId) -> CatalogResult<Device> {
        let mut inner = self.inner.write().await;
        let device = inner
            .devices
            .remove(&id)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Device, id))?;
        inner.slots.retain(|(device_id, _), _| *device_id != id);
        debug!("removed device {id} and its slots");
        Ok(device)
    }

    async fn slots(&self, device_id: DeviceId) -> CatalogResult<Vec<Slot>> {
        let inner = self.inner.read().await;
        if !inner.devices.contains_key(&device_id) {
            return Err(CatalogError::not_found(EntityKind::Device, device_id));
        }
        Ok(inner
            .slots
            .range((device_id, u8::MIN)..=(device_id, u8::MAX))
            .map(|(_, slot)| slot.clone())
            .collect())
    }

    async fn slot(&self, device_id: DeviceId, slot_id: u8) -> CatalogResult<Slot> {
        self.inner
            .read()
            .await
            .slots
            .get(&(device_id, slot_id))
            .cloned()
            .ok_or_else(|| {
                CatalogError::not_found(EntityKind::Slot, format!("{slot_id} of device {device_id}"))
            })
    }

    async fn put_slot(&self, slot: Slot) -> CatalogResult<Slot> {
        let mut inner = self.inner.write().await;
        if !inner.devices.contains_key(&slot.device_id) {
            return Err(CatalogError::not_found(EntityKind::Device, slot.device_id));
        }
        if let Some(scheme_id) = slot.scheme_id {
            if !inner.schemes.contains_key(&scheme_id) {
                return Err(CatalogError::not_found(EntityKind::Scheme, scheme_id));
            }
        }
        inner.slots.insert((slot.device_id, slot.slot_id), slot.clone());
        Ok(slot)
    }

    async fn remove_slot(&self, device_id: DeviceId, slot_id: u8) -> CatalogResult<()> {
        self.inner
            .write()
            .await
            .slots
            .remove(&(device_id, slot_id))
            .map(drop)
            .ok_or_else(|| {
                CatalogError::not_found(EntityKind::Slot, format!("{slot_id} of device {device_id}"))
            })
    }

    async fn captures(&self) -> CatalogResult<Vec<Capture>> {
        Ok(self.inner.read().await.captures.values().cloned().collect())
    }

    async fn capture(&self, id: EntityId) -> CatalogResult<Capture> {
        lookup(&self.inner.read().await.captures, EntityKind::Capture, id)
    }

    async fn create_capture(&self, mut capture: Capture) -> CatalogResult<Capture> {
        capture.validate()?;
        let mut inner = self.inner.write().await;
        ensure_unique_name(
            EntityKind::Capture,
            &capture.name,
            inner.captures.values().map(|c| (c.id, c.name.as_str())),
            None,
        )?;
        capture.id = inner.allocate_id();
        inner.captures.insert(capture.id, capture.clone());
        Ok(capture)
    }

    async fn update_capture(&self, capture: Capture) -> CatalogResult<Capture> {
        capture.validate()?;
        let mut inner = self.inner.write().await;
        if !inner.captures.contains_key(&capture.id) {
            return Err(CatalogError::not_found(EntityKind::Capture, capture.id));
        }
        ensure_unique_name(
            EntityKind::Capture,
            &capture.name,
            inner.captures.values().map(|c| (c.id, c.name.as_str())),
            Some(capture.id),
        )?;
        inner.captures.insert(capture.id, capture.clone());
        Ok(capture)
    }

    async fn delete_capture(&self, id: EntityId) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        if inner.sources.values().any(|s| s.capture_id == id) {
            return Err(CatalogError::Conflict(format!("capture {id} is used by a source")));
        }
        inner
            .captures
            .remove(&id)
            .map(drop)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Capture, id))
    }

    async fn sources(&self) -> CatalogResult<Vec<Source>> {
        Ok(self.inner.read().await.sources.values().cloned().collect())
    }

    async fn source(&self, id: EntityId) -> CatalogResult<Source> {
        lookup(&self.inner.read().await.sources, EntityKind::Source, id)
    }

    async fn create_source(&self, mut source: Source) -> CatalogResult<Source> {
        let mut inner = self.inner.write().await;
        let capture = lookup(&inner.captures, EntityKind::Capture, source.capture_id)?;
        source.validate(&capture)?;
        ensure_unique_name(
            EntityKind::Source,
            &source.name,
            inner.sources.values().map(|s| (s.id, s.name.as_str())),
            None,
        )?;
        source.id = inner.allocate_id();
        inner.sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn delete_source(&self, id: EntityId) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .schemes
            .values()
            .any(|s| s.source1_id == id || s.source2_id == Some(id))
        {
            return Err(CatalogError::Conflict(format!("source {id} is used by a scheme")));
        }
        inner
            .sources
            .remove(&id)
            .map(drop)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Source, id))
    }

    async fn presets(&self) -> CatalogResult<Vec<Preset>> {
        Ok(self.inner.read().await.presets.values().cloned().collect())
    }

    async fn preset(&self, id: EntityId) -> CatalogResult<Preset> {
        lookup(&self.inner.read().await.presets, EntityKind::Preset, id)
    }

    async fn create_preset(&self, mut preset: Preset) -> CatalogResult<Preset> {
        preset.validate()?;
        let mut inner = self.inner.write().await;
        preset.id = inner.allocate_id();
        inner.presets.insert(preset.id, preset.clone());
        Ok(preset)
    }

    async fn delete_preset(&self, id: EntityId) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        if inner.schemes.values().any(|s| s.preset_id == id) {
            return Err(CatalogError::Conflict(format!("preset {id} is used by a scheme")));
        }
        inner
            .presets
            .remove(&id)
            .map(drop)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Preset, id))
    }

    async fn schemes(&self) -> CatalogResult<Vec<Scheme>> {
        Ok(self.inner.read().await.schemes.values().cloned().collect())
    }

    async fn scheme(&self, id: EntityId) -> CatalogResult<Scheme> {
        lookup(&self.inner.read().await.schemes, EntityKind::Scheme, id)
    }

    async fn create_scheme(&self, mut scheme: Scheme) -> CatalogResult<Scheme> {
        let mut inner = self.inner.write().await;
        let preset = lookup(&inner.presets, EntityKind::Preset, scheme.preset_id)?;
        lookup(&inner.sources, EntityKind::Source, scheme.source1_id)?;
        if let Some(source2_id) = scheme.source2_id {
            lookup(&inner.sources, EntityKind::Source, source2_id)?;
        }
        scheme.validate(&preset)?;
        ensure_unique_name(
            EntityKind::Scheme,
            &scheme.name,
            inner.schemes.values().map(|s| (s.id, s.name.as_str())),
            None,
        )?;
        scheme.id = inner.allocate_id();
        inner.schemes.insert(scheme.id, scheme.clone());
        Ok(scheme)
    }

    async fn delete_scheme(&self, id: EntityId) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        if inner.slots.values().any(|s| s.scheme_id == Some(id)) {
            return Err(CatalogError::Conflict(format!("scheme {id} is bound to a slot")));
        }
        inner
            .schemes
            .remove(&id)
            .map(drop)
            .ok_or_else(|| CatalogError::not_found(EntityKind::Scheme, id))
    }
}
