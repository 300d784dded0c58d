//! Metrics store trait definition
//!
//! This module defines the `MetricsStore` trait that every backend
//! implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{Metric, MetricEntry, MetricValue, RangeQuery};
use crate::DeviceId;

/// Append-only time series keyed by (device id, metric name)
///
/// ## Consistency
///
/// Implementations must make `append` and `range` atomic per key: a range
/// query never observes a half-written append. Entries with equal
/// timestamps are returned in insertion order.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// monitor actor, the pruning task and the query path.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one entry to a series
    async fn append(
        &self,
        device_id: DeviceId,
        metric: Metric,
        timestamp: DateTime<Utc>,
        value: MetricValue,
    ) -> StorageResult<()>;

    /// Entries with timestamp in `[query.min, query.max]`
    ///
    /// Oldest first unless `query.reverse` is set; `query.limit` caps the
    /// result after ordering.
    async fn range(&self, query: RangeQuery) -> StorageResult<Vec<MetricEntry>>;

    /// Delete entries of one series with timestamp strictly before `older_than`
    ///
    /// Returns the number of entries deleted.
    async fn prune(
        &self,
        device_id: DeviceId,
        metric: Metric,
        older_than: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Remove every series of a device
    async fn delete_all(&self, device_id: DeviceId) -> StorageResult<()>;

    /// Human-readable stats about the backend
    async fn get_stats(&self) -> StorageResult<String>;

    /// Release resources held by the backend
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
