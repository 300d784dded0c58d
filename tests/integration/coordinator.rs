//! Coordinator lifecycle, membership and history queries

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use transcoder_hub::storage::{Metric, MetricValue, Period};
use transcoder_hub::{Liveness, LoadStatus};

use crate::helpers::{FakeDevice, Harness, test_device};

async fn wait_until_probed(harness: &Harness, device_id: u32) {
    let handle = harness.coordinator.monitor(device_id).await.unwrap();
    for _ in 0..100 {
        if handle.liveness().await.unwrap() != Liveness::Unknown {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("device {device_id} never probed");
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let h = Harness::new(&[1, 2]).await;
    h.attach(1, FakeDevice::alive());
    h.attach(2, FakeDevice::alive());

    h.coordinator.start().await.unwrap();
    h.coordinator.start().await.unwrap();

    assert!(h.coordinator.is_started().await);
    assert_eq!(h.coordinator.monitored_devices().await, vec![1, 2]);

    h.coordinator.shutdown().await;
    assert!(!h.coordinator.is_started().await);
    assert!(h.coordinator.monitored_devices().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_before_start_is_noop() {
    let h = Harness::new(&[1]).await;
    h.coordinator.shutdown().await;
    assert!(!h.coordinator.is_started().await);

    // adding before start does not spawn anything
    h.coordinator.add_device(1).await.unwrap();
    assert!(h.coordinator.monitored_devices().await.is_empty());
}

#[tokio::test]
async fn test_add_and_remove_device() {
    let h = Harness::new(&[1]).await;
    h.attach(1, FakeDevice::alive());
    h.coordinator.start().await.unwrap();

    h.catalog.add_device(test_device(2)).await.unwrap();
    h.attach(2, FakeDevice::alive());
    h.coordinator.add_device(2).await.unwrap();
    h.coordinator.add_device(2).await.unwrap();
    assert_eq!(h.coordinator.monitored_devices().await, vec![1, 2]);

    assert!(h.coordinator.remove_device(1).await);
    assert!(!h.coordinator.remove_device(1).await);
    assert_eq!(h.coordinator.monitored_devices().await, vec![2]);

    let err = h.coordinator.add_device(42).await.unwrap_err();
    assert!(err.is_not_found());

    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_removed_device_keeps_history() {
    let h = Harness::new(&[1]).await;
    h.attach(1, FakeDevice::alive());
    h.coordinator.start().await.unwrap();
    wait_until_probed(&h, 1).await;

    h.coordinator.remove_device(1).await;

    let states = h
        .coordinator
        .get_metric(1, Metric::State, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].value, MetricValue::State(true));

    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_wakeup_alerts_only_on_difference() {
    let h = Harness::new(&[1]).await;

    // no history: record only
    h.coordinator.on_wakeup_state(1, true).await.unwrap();
    assert!(h.notifier.alerts().is_empty());

    // same as stored: record only
    h.coordinator.on_wakeup_state(1, true).await.unwrap();
    assert!(h.notifier.alerts().is_empty());

    // differs from stored: alert
    h.coordinator.on_wakeup_state(1, false).await.unwrap();
    assert_eq!(h.notifier.alerts(), vec![(1, false)]);

    // confirmed changes always alert
    h.coordinator.on_state_changed(1, true).await.unwrap();
    assert_eq!(h.notifier.alerts(), vec![(1, false), (1, true)]);

    let states = h
        .coordinator
        .get_metric(1, Metric::State, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(states.len(), 4);
}

#[tokio::test]
async fn test_temperatures_grouped_by_core() {
    let h = Harness::new(&[1]).await;

    for cpu in [10.0, 20.0] {
        let status = LoadStatus {
            cpu,
            temperatures: BTreeMap::from([(0, 50.0), (3, 61.0), (9, 99.0)]),
        };
        h.coordinator.on_load_status(1, &status).await.unwrap();
    }

    let temps = h
        .coordinator
        .get_temperatures(1, Period::Day, false, None)
        .await
        .unwrap();
    assert_eq!(temps.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
    assert_eq!(temps[&3].len(), 2);

    let latest_cpu = h
        .coordinator
        .get_metric(1, Metric::Cpu, Period::Day, true, Some(1))
        .await
        .unwrap();
    assert_eq!(latest_cpu[0].value, MetricValue::Number(20.0));
}

#[tokio::test]
async fn test_prune_all_and_purge() {
    let h = Harness::new(&[1, 2]).await;

    let old = Utc::now() - chrono::Duration::days(10);
    h.store
        .append(1, Metric::Cpu, old, MetricValue::Number(5.0))
        .await
        .unwrap();
    h.store
        .append(2, Metric::Events, old, MetricValue::Event("old".into()))
        .await
        .unwrap();
    h.coordinator.on_event(1, "slot 1 stopped").await.unwrap();

    let removed = h.coordinator.prune_all(Period::Week).await.unwrap();
    assert_eq!(removed, 2);

    let events = h
        .coordinator
        .get_metric(1, Metric::Events, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    h.coordinator.purge_history(1).await.unwrap();
    let events = h
        .coordinator
        .get_metric(1, Metric::Events, Period::All, false, None)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_crashed_monitor_is_isolated_and_replaced() {
    let h = Harness::new(&[1, 2]).await;
    let crashing = FakeDevice::alive();
    crashing.set_crash_on_check(true);
    let healthy = FakeDevice::alive();
    h.attach(1, crashing.clone());
    h.attach(2, healthy.clone());

    h.coordinator.start().await.unwrap();

    let dead = h.coordinator.monitor(1).await.unwrap();
    for _ in 0..100 {
        if !dead.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!dead.is_running());
    assert!(dead.check_now().await.is_err());

    // device 2 keeps monitoring and recording
    wait_until_probed(&h, 2).await;
    let monitor = h.coordinator.monitor(2).await.unwrap();
    healthy.set_alive(false);
    monitor.check_now().await.unwrap();
    monitor.check_now().await.unwrap();
    assert_eq!(monitor.liveness().await.unwrap(), Liveness::Dead);

    let states = h
        .coordinator
        .get_metric(2, Metric::State, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(
        states.iter().map(|e| e.value.clone()).collect::<Vec<_>>(),
        vec![MetricValue::State(true), MetricValue::State(false)]
    );
    assert!(
        h.coordinator
            .get_metric(1, Metric::State, Period::All, false, None)
            .await
            .unwrap()
            .is_empty()
    );

    // re-adding replaces the dead monitor
    crashing.set_crash_on_check(false);
    h.coordinator.add_device(1).await.unwrap();
    assert!(h.coordinator.monitor(1).await.unwrap().is_running());
    wait_until_probed(&h, 1).await;
    assert_eq!(h.coordinator.monitored_devices().await, vec![1, 2]);

    tokio::time::timeout(Duration::from_secs(5), h.coordinator.shutdown())
        .await
        .unwrap();
    assert!(h.coordinator.monitored_devices().await.is_empty());
}
