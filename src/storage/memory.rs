//! In-memory metrics store (no persistence)
//!
//! Series live in ordered maps behind a single `RwLock`. Used when the
//! config selects `"backend": "none"` and throughout the tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::MetricsStore;
use super::error::StorageResult;
use super::schema::{Metric, MetricEntry, MetricValue, RangeQuery};
use crate::DeviceId;

/// Entries ordered by timestamp, ties broken by insertion sequence
type Series = BTreeMap<(DateTime<Utc>, u64), MetricValue>;

#[derive(Default)]
struct Inner {
    series: HashMap<(DeviceId, Metric), Series>,
    next_seq: u64,
}

/// In-memory metrics store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn append(
        &self,
        device_id: DeviceId,
        metric: Metric,
        timestamp: DateTime<Utc>,
        value: MetricValue,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner
            .series
            .entry((device_id, metric))
            .or_default()
            .insert((timestamp, seq), value);

        trace!("appended {metric} for device {device_id} at {timestamp}");
        Ok(())
    }

    async fn range(&self, query: RangeQuery) -> StorageResult<Vec<MetricEntry>> {
        if query.min > query.max {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let Some(series) = inner.series.get(&(query.device_id, query.metric)) else {
            return Ok(Vec::new());
        };

        let window = series.range((query.min, u64::MIN)..=(query.max, u64::MAX));
        let limit = query.limit.unwrap_or(usize::MAX);
        let to_entry = |((timestamp, _), value): (&(DateTime<Utc>, u64), &MetricValue)| {
            MetricEntry::new(*timestamp, value.clone())
        };

        let entries = if query.reverse {
            window.rev().take(limit).map(to_entry).collect()
        } else {
            window.take(limit).map(to_entry).collect()
        };

        Ok(entries)
    }

    async fn prune(
        &self,
        device_id: DeviceId,
        metric: Metric,
        older_than: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let Some(series) = inner.series.get_mut(&(device_id, metric)) else {
            return Ok(0);
        };

        let kept = series.split_off(&(older_than, u64::MIN));
        let deleted = series.len();
        *series = kept;

        if deleted > 0 {
            debug!("pruned {deleted} {metric} entries of device {device_id}");
        }
        Ok(deleted)
    }

    async fn delete_all(&self, device_id: DeviceId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.series.retain(|(id, _), _| *id != device_id);
        debug!("deleted all history of device {device_id}");
        Ok(())
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let inner = self.inner.read().await;
        let total: usize = inner.series.values().map(BTreeMap::len).sum();
        Ok(format!(
            "In-Memory: {} entries across {} series",
            total,
            inner.series.len()
        ))
    }
}
