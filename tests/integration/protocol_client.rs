//! DeviceClient against a simulated device over real sockets

use std::net::Ipv4Addr;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use transcoder_hub::protocol::{DeviceApi, DeviceClient, DeviceError, SlotStart, SlotStatus};

use crate::fake_device::{Behavior, DeviceServer};
use crate::helpers::{FakeDevice, running, source_addr, two_tracks};

fn client(server: &DeviceServer) -> DeviceClient {
    DeviceClient::new(server.addr, Duration::from_secs(2))
}

#[tokio::test]
async fn test_slot_lifecycle_over_the_wire() {
    let device = FakeDevice::alive();
    let server = DeviceServer::spawn(device.clone(), Behavior::Answer).await;
    let client = client(&server);

    assert!(client.is_alive().await);
    client.create_slot(3, &two_tracks()).await.unwrap();
    assert_eq!(client.get_slots().await.unwrap(), vec![3]);
    assert_eq!(client.get_slot(3).await.unwrap(), two_tracks());
    assert_eq!(client.get_slot_status(3).await.unwrap(), SlotStatus::Stopped);

    let start = SlotStart {
        source1: source_addr(1, 5000),
        source2: source_addr(2, 5002),
        audio_mapping: vec![1, 2],
    };
    client.restart_slot(3, &start).await.unwrap();

    let status = client.get_slot_status(3).await.unwrap();
    let SlotStatus::Running(live) = status else {
        panic!("slot 3 should be running, got {status:?}");
    };
    assert_eq!((live.source1, live.source2), (start.source1, start.source2));
    assert_eq!(live.audio_mapping, vec![1, 2]);

    client.stop_slot(3).await.unwrap();
    client.remove_slot(3).await.unwrap();
    assert!(client.get_slots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_running_slot_decodes_sources() {
    let device = FakeDevice::alive();
    device.add_running_slot(1, two_tracks(), running(source_addr(7, 6000), source_addr(7, 6001)));
    let server = DeviceServer::spawn(device, Behavior::Answer).await;

    let status = client(&server).get_slot_status(1).await.unwrap();
    assert_matches!(status, SlotStatus::Running(live) if live.source1 == source_addr(7, 6000) && live.uptime == 120);
}

#[tokio::test]
async fn test_net_config() {
    let server = DeviceServer::spawn(FakeDevice::alive(), Behavior::Answer).await;

    let config = client(&server).get_net_config().await.unwrap();
    assert_eq!(config.netmask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(config.gateway, Ipv4Addr::new(10, 0, 0, 1));
}

#[tokio::test]
async fn test_device_error_is_not_transport() {
    let server = DeviceServer::spawn(FakeDevice::alive(), Behavior::Answer).await;

    let err = client(&server).get_slot(9).await.unwrap_err();
    assert_matches!(&err, DeviceError::Device { code: 2, message } if message == "no slot 9");
    assert!(!err.is_transport());
    assert_eq!(err.device_code(), Some(2));
}

#[tokio::test]
async fn test_reset_connection_is_transport() {
    let server = DeviceServer::spawn(FakeDevice::alive(), Behavior::Reset).await;
    let client = client(&server);

    let err = client.get_slots().await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {err:?}");
    assert_eq!(err.device_code(), None);
    assert!(!client.is_alive().await);
}
