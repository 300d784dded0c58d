//! Configuration model boundary
//!
//! The operator-managed configuration (devices, slots, captures, sources,
//! presets, schemes) lives behind the [`Catalog`] trait. The crate only
//! reads it, except for the slot bindings and placeholder entities that
//! reconciliation creates.

pub mod error;
pub mod matching;
pub mod memory;
pub mod model;

use std::net::SocketAddrV4;

use async_trait::async_trait;

pub use error::{CatalogError, CatalogResult};
pub use matching::{EntityMatch, Resolver};
pub use memory::MemoryCatalog;
pub use model::{Capture, Device, EntityId, EntityKind, Preset, Scheme, Slot, Source, Track};

use crate::DeviceId;
use crate::protocol::SlotStart;

/// Storage of configuration entities
///
/// `create_*` methods ignore the `id` of the passed entity and return the
/// stored copy with its assigned id. Names of devices, captures, sources
/// and schemes are unique.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn devices(&self) -> CatalogResult<Vec<Device>>;
    async fn device(&self, id: DeviceId) -> CatalogResult<Device>;
    /// Devices keep the id they are registered with
    async fn add_device(&self, device: Device) -> CatalogResult<Device>;
    /// Removes the device and all of its slots
    async fn remove_device(&self, id: DeviceId) -> CatalogResult<Device>;

    async fn slots(&self, device_id: DeviceId) -> CatalogResult<Vec<Slot>>;
    async fn slot(&self, device_id: DeviceId, slot_id: u8) -> CatalogResult<Slot>;
    /// Insert or replace a slot
    async fn put_slot(&self, slot: Slot) -> CatalogResult<Slot>;
    async fn remove_slot(&self, device_id: DeviceId, slot_id: u8) -> CatalogResult<()>;

    async fn captures(&self) -> CatalogResult<Vec<Capture>>;
    async fn capture(&self, id: EntityId) -> CatalogResult<Capture>;
    async fn create_capture(&self, capture: Capture) -> CatalogResult<Capture>;
    async fn update_capture(&self, capture: Capture) -> CatalogResult<Capture>;
    async fn delete_capture(&self, id: EntityId) -> CatalogResult<()>;

    async fn sources(&self) -> CatalogResult<Vec<Source>>;
    async fn source(&self, id: EntityId) -> CatalogResult<Source>;
    async fn create_source(&self, source: Source) -> CatalogResult<Source>;
    async fn delete_source(&self, id: EntityId) -> CatalogResult<()>;

    async fn presets(&self) -> CatalogResult<Vec<Preset>>;
    async fn preset(&self, id: EntityId) -> CatalogResult<Preset>;
    async fn create_preset(&self, preset: Preset) -> CatalogResult<Preset>;
    async fn delete_preset(&self, id: EntityId) -> CatalogResult<()>;

    async fn schemes(&self) -> CatalogResult<Vec<Scheme>>;
    async fn scheme(&self, id: EntityId) -> CatalogResult<Scheme>;
    async fn create_scheme(&self, scheme: Scheme) -> CatalogResult<Scheme>;
    async fn delete_scheme(&self, id: EntityId) -> CatalogResult<()>;

    /// Host and port a source reads from
    async fn source_endpoint(&self, source_id: EntityId) -> CatalogResult<SocketAddrV4> {
        let source = self.source(source_id).await?;
        let capture = self.capture(source.capture_id).await?;
        source.endpoint(&capture)
    }

    /// Arguments for `restart_slot` built from a scheme
    async fn start_args(&self, scheme: &Scheme) -> CatalogResult<SlotStart> {
        Ok(SlotStart {
            source1: self.source_endpoint(scheme.source1_id).await?,
            source2: self.source_endpoint(scheme.effective_source2()).await?,
            audio_mapping: scheme.audio_mapping.clone(),
        })
    }
}
