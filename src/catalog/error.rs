use super::model::{EntityId, EntityKind};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid {kind}: {reason}")]
    Validation { kind: EntityKind, reason: String },

    /// Unique name taken, or the entity is still referenced
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capture {capture_id} has no free input")]
    CaptureFull { capture_id: EntityId },
}

impl CatalogError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        CatalogError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
