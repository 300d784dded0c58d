//! Configuration sync against scripted devices

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use transcoder_hub::catalog::{Catalog, Slot};
use transcoder_hub::error::HubError;
use transcoder_hub::reconcile::{SYNC_EVENT, SyncEngine};
use transcoder_hub::storage::{Metric, MetricValue, Period};
use transcoder_hub::util::is_placeholder_name;

use crate::helpers::{FakeDevice, Harness, running, source_addr, two_tracks};

async fn seed_slots(h: &Harness, device_id: u32, slot_ids: &[u8]) {
    for slot_id in slot_ids {
        h.catalog.put_slot(Slot::bare(device_id, *slot_id)).await.unwrap();
    }
}

async fn slot_ids(catalog: &dyn Catalog, device_id: u32) -> Vec<u8> {
    catalog
        .slots(device_id)
        .await
        .unwrap()
        .into_iter()
        .map(|slot| slot.slot_id)
        .collect()
}

#[tokio::test]
async fn test_sync_aligns_slot_sets() {
    let h = Harness::new(&[1]).await;
    seed_slots(&h, 1, &[1, 2, 3]).await;

    let device = FakeDevice::alive();
    device.add_running_slot(2, two_tracks(), running(source_addr(1, 5000), source_addr(1, 5001)));
    device.add_stopped_slot(3, two_tracks());
    device.add_stopped_slot(4, two_tracks());
    h.attach(1, device);

    let engine = SyncEngine::new(h.coordinator.clone());
    let report = engine.sync(1).await.unwrap();

    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert_eq!(report.removed, vec![1]);
    assert_eq!(report.created, vec![4]);
    assert_eq!(report.bound.len(), 1);
    assert_eq!(slot_ids(h.catalog.as_ref(), 1).await, vec![2, 3, 4]);

    let (slot_id, scheme_id) = report.bound[0];
    assert_eq!(slot_id, 2);
    assert_eq!(h.catalog.slot(1, 2).await.unwrap().scheme_id, Some(scheme_id));
    assert_eq!(h.catalog.slot(1, 4).await.unwrap().scheme_id, None);

    // both sources live on one placeholder capture
    let captures = h.catalog.captures().await.unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].inputs, [5000, 5001, 0, 0]);
    assert!(is_placeholder_name(&captures[0].name));

    let scheme = h.catalog.scheme(scheme_id).await.unwrap();
    let preset = h.catalog.preset(scheme.preset_id).await.unwrap();
    assert!(preset.has_tracks(&two_tracks()));
    assert_eq!(scheme.audio_mapping, vec![1, 2]);
    assert_ne!(scheme.source2_id, None);

    let events = h
        .coordinator
        .get_metric(1, Metric::Events, Period::All, false, None)
        .await
        .unwrap();
    assert_eq!(events.last().unwrap().value, MetricValue::Event(SYNC_EVENT.into()));
}

#[tokio::test]
async fn test_second_sync_creates_nothing() {
    let h = Harness::new(&[1]).await;
    let device = FakeDevice::alive();
    device.add_running_slot(1, two_tracks(), running(source_addr(1, 5000), source_addr(1, 5000)));
    h.attach(1, device);

    let engine = SyncEngine::new(h.coordinator.clone());
    let first = engine.sync(1).await.unwrap();
    let second = engine.sync(1).await.unwrap();

    assert_eq!(first.created, vec![1]);
    assert!(second.created.is_empty() && second.removed.is_empty());
    assert_eq!(first.bound, second.bound);

    assert_eq!(h.catalog.captures().await.unwrap().len(), 1);
    assert_eq!(h.catalog.sources().await.unwrap().len(), 1);
    assert_eq!(h.catalog.presets().await.unwrap().len(), 1);

    // identical legs collapse into a single-source scheme
    let schemes = h.catalog.schemes().await.unwrap();
    assert_eq!(schemes.len(), 1);
    assert_eq!(schemes[0].source2_id, None);
}

#[tokio::test]
async fn test_devices_share_matched_entities() {
    let h = Harness::new(&[1, 2]).await;
    for id in [1, 2] {
        let device = FakeDevice::alive();
        device.add_running_slot(1, two_tracks(), running(source_addr(3, 7000), source_addr(3, 7002)));
        h.attach(id, device);
    }

    let engine = SyncEngine::new(h.coordinator.clone());
    let results = engine.sync_all().await.unwrap();
    assert_eq!(results.len(), 2);

    let bound: Vec<_> = results
        .into_iter()
        .map(|(_, report)| report.unwrap().bound[0].1)
        .collect();
    assert_eq!(bound[0], bound[1]);
    assert_eq!(h.catalog.schemes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slot_failure_does_not_stop_the_run() {
    let h = Harness::new(&[1]).await;
    let device = FakeDevice::alive();
    device.add_running_slot(1, two_tracks(), running(source_addr(1, 5000), source_addr(1, 5001)));
    device.add_stopped_slot(2, two_tracks());
    device.fail_slot(2);
    h.attach(1, device);

    let report = SyncEngine::new(h.coordinator.clone()).sync(1).await.unwrap();

    assert_eq!(report.created, vec![1, 2]);
    assert_eq!(report.bound.len(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_matches!(report.errors[0], HubError::Reconciliation { slot_id: 2, .. });
}

#[tokio::test]
async fn test_unreachable_device_is_left_alone() {
    let h = Harness::new(&[1]).await;
    seed_slots(&h, 1, &[1, 2]).await;
    let device = FakeDevice::default();
    h.attach(1, device.clone());

    let err = SyncEngine::new(h.coordinator.clone()).sync(1).await.unwrap_err();

    assert_matches!(err, HubError::DeviceUnreachable(1));
    assert_eq!(slot_ids(h.catalog.as_ref(), 1).await, vec![1, 2]);
    assert_eq!(device.calls(), vec!["ping".to_string()]);
}

#[tokio::test]
async fn test_stopped_slot_keeps_its_binding() {
    let h = Harness::new(&[1]).await;
    let device = FakeDevice::alive();
    device.add_running_slot(1, two_tracks(), running(source_addr(1, 5000), source_addr(1, 5001)));
    h.attach(1, device.clone());

    let engine = SyncEngine::new(h.coordinator.clone());
    let scheme_id = engine.sync(1).await.unwrap().bound[0].1;

    device.add_stopped_slot(1, two_tracks());
    let report = engine.sync(1).await.unwrap();

    assert!(report.bound.is_empty());
    assert_eq!(h.catalog.slot(1, 1).await.unwrap().scheme_id, Some(scheme_id));
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let h = Harness::new(&[]).await;
    let err = SyncEngine::new(h.coordinator.clone()).sync(5).await.unwrap_err();
    assert!(err.is_not_found());
}
