//! SQLite metrics store
//!
//! This module provides a SQLite-based implementation of the `MetricsStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Each entry is one row of `metric_entries`; values are stored as JSON.
//! Ties on `timestamp` are ordered by `id`, which preserves insertion order.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::MetricsStore;
use super::error::{StorageError, StorageResult};
use super::schema::{Metric, MetricEntry, MetricValue, RangeQuery};
use crate::DeviceId;

/// SQLite metrics store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use transcoder_hub::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./metrics.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    #[instrument(skip(self, value))]
    async fn append(
        &self,
        device_id: DeviceId,
        metric: Metric,
        timestamp: DateTime<Utc>,
        value: MetricValue,
    ) -> StorageResult<()> {
        let value_json = serde_json::to_string(&value).map_err(|e| {
            StorageError::SerializationError(format!("failed to serialize value: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO metric_entries (device_id, metric, timestamp, value)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(device_id as i64)
        .bind(metric.to_string())
        .bind(Self::timestamp_to_millis(&timestamp))
        .bind(value_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(device_id = query.device_id, metric = %query.metric))]
    async fn range(&self, query: RangeQuery) -> StorageResult<Vec<MetricEntry>> {
        let order = if query.reverse { "DESC" } else { "ASC" };
        let limit_clause = query
            .limit
            .map(|l| format!("LIMIT {l}"))
            .unwrap_or_default();

        let sql = format!(
            r#"
            SELECT timestamp, value
            FROM metric_entries
            WHERE device_id = ? AND metric = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp {order}, id {order}
            {limit_clause}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(query.device_id as i64)
            .bind(query.metric.to_string())
            .bind(Self::timestamp_to_millis(&query.min))
            .bind(Self::timestamp_to_millis(&query.max))
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .into_iter()
            .map(|row| {
                let value_str: String = row.get("value");
                let value: MetricValue = serde_json::from_str(&value_str).map_err(|e| {
                    StorageError::SerializationError(format!("failed to deserialize value: {e}"))
                })?;
                Ok(MetricEntry::new(Self::millis_to_timestamp(row.get("timestamp")), value))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        debug!("query returned {} entries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn prune(
        &self,
        device_id: DeviceId,
        metric: Metric,
        older_than: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let result = sqlx::query(
            "DELETE FROM metric_entries WHERE device_id = ? AND metric = ? AND timestamp < ?",
        )
        .bind(device_id as i64)
        .bind(metric.to_string())
        .bind(Self::timestamp_to_millis(&older_than))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, device_id: DeviceId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM metric_entries WHERE device_id = ?")
            .bind(device_id as i64)
            .execute(&self.pool)
            .await?;

        info!("deleted {} entries of device {device_id}", result.rows_affected());
        Ok(())
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM metric_entries")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");

        Ok(format!("SQLite ({}): {} rows", self.db_path, count))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite pool");
        self.pool.close().await;
        Ok(())
    }
}
