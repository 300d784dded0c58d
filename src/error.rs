//! Crate-level error returned by the coordinator, slot controller and sync

use crate::DeviceId;
use crate::catalog::CatalogError;
use crate::protocol::DeviceError;
use crate::storage::StorageError;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("device request failed: {0}")]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("device {0} is not responding")]
    DeviceUnreachable(DeviceId),

    #[error("slot {slot_id}: {reason}")]
    Reconciliation { slot_id: u8, reason: String },
}

impl HubError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::Catalog(CatalogError::NotFound { .. }))
    }

    /// Failure below the device protocol (safe to retry later)
    pub fn is_transport(&self) -> bool {
        matches!(self, HubError::Device(e) if e.is_transport())
    }
}
