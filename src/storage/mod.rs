//! Metrics store for per-device time series
//!
//! ## Design
//!
//! - **Trait-based**: `MetricsStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Keyed series**: one ordered series per (device, metric)
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, survives restarts
//! - **In-Memory**: No persistence, for tests or `"backend": "none"`

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::MetricsStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{Metric, MetricEntry, MetricValue, Period, RangeQuery};

use crate::config::StorageConfig;

/// Open the store selected by the config
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn MetricsStore>> {
    match config {
        StorageConfig::None => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
