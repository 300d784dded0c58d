//! History survives a hub restart with the SQLite store
//!
//! The wakeup alert decision reads the last stored state, so a restart must
//! see what the previous run wrote.

use std::sync::Arc;

use tempfile::tempdir;
use transcoder_hub::storage::sqlite::SqliteStore;
use transcoder_hub::storage::{Metric, MetricValue, MetricsStore, Period};

use crate::helpers::Harness;

#[tokio::test]
async fn test_wakeup_after_restart_uses_stored_state() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("metrics.db");

    {
        let store: Arc<dyn MetricsStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let h = Harness::with_store(&[1, 2], store.clone()).await;
        h.coordinator.on_wakeup_state(1, true).await.unwrap();
        h.coordinator.on_wakeup_state(2, true).await.unwrap();
        h.coordinator.on_event(1, "slot 3 started with scheme main").await.unwrap();
        store.close().await.unwrap();
    }

    let store: Arc<dyn MetricsStore> = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    let h = Harness::with_store(&[1, 2], store).await;

    // device 1 comes back in the stored state, device 2 does not
    h.coordinator.on_wakeup_state(1, true).await.unwrap();
    h.coordinator.on_wakeup_state(2, false).await.unwrap();
    assert_eq!(h.notifier.alerts(), vec![(2, false)]);

    let events = h
        .coordinator
        .get_metric(1, Metric::Events, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(
        events.iter().map(|e| e.value.clone()).collect::<Vec<_>>(),
        vec![MetricValue::Event("slot 3 started with scheme main".into())]
    );
}

#[tokio::test]
async fn test_load_series_round_trip_through_sqlite() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn MetricsStore> =
        Arc::new(SqliteStore::new(dir.path().join("metrics.db")).await.unwrap());
    let h = Harness::with_store(&[7], store).await;

    let status = transcoder_hub::LoadStatus {
        cpu: 12.5,
        temperatures: [(0, 48.0), (7, 52.5)].into_iter().collect(),
    };
    h.coordinator.on_load_status(7, &status).await.unwrap();

    let temps = h
        .coordinator
        .get_temperatures(7, Period::Hour, false, None)
        .await
        .unwrap();
    assert_eq!(temps.len(), 2);
    assert_eq!(temps[&7][0].value, MetricValue::Number(52.5));

    let removed = h.coordinator.prune_all(Period::All).await.unwrap();
    assert_eq!(removed, 0);
}
