//! In-process stand-ins for devices, connectors and alert sinks

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use transcoder_hub::DeviceId;
use transcoder_hub::LoadStatus;
use transcoder_hub::actors::Coordinator;
use transcoder_hub::catalog::{Catalog, Device, MemoryCatalog};
use transcoder_hub::config::MonitorSettings;
use transcoder_hub::notify::Notifier;
use transcoder_hub::protocol::{
    Connector, DeviceApi, DeviceEndpoint, DeviceError, DeviceProbe, DeviceResult, LoadStatusError,
    NetConfig, RunningSlot, SlotStart, SlotStatus, WireTrack,
};
use transcoder_hub::storage::{MemoryStore, MetricsStore};

#[derive(Default)]
struct DeviceState {
    alive: bool,
    slots: BTreeMap<u8, (Vec<WireTrack>, SlotStatus)>,
    failing_slots: HashSet<u8>,
    load: Option<LoadStatus>,
    calls: Vec<String>,
    crash_on_check: bool,
}

/// Scriptable transcoder that answers from memory
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn alive() -> Self {
        let device = Self::default();
        device.set_alive(true);
        device
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.lock().unwrap().alive = alive;
    }

    /// Liveness checks panic inside the monitor task while set
    pub fn set_crash_on_check(&self, crash: bool) {
        self.state.lock().unwrap().crash_on_check = crash;
    }

    pub fn set_load(&self, load: LoadStatus) {
        self.state.lock().unwrap().load = Some(load);
    }

    pub fn add_stopped_slot(&self, slot_id: u8, tracks: Vec<WireTrack>) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(slot_id, (tracks, SlotStatus::Stopped));
    }

    pub fn add_running_slot(&self, slot_id: u8, tracks: Vec<WireTrack>, running: RunningSlot) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(slot_id, (tracks, SlotStatus::Running(running)));
    }

    /// Status queries for this slot fail with a device error
    pub fn fail_slot(&self, slot_id: u8) {
        self.state.lock().unwrap().failing_slots.insert(slot_id);
    }

    pub fn slot_ids(&self) -> Vec<u8> {
        self.state.lock().unwrap().slots.keys().copied().collect()
    }

    pub fn slot_status(&self, slot_id: u8) -> Option<SlotStatus> {
        self.state
            .lock()
            .unwrap()
            .slots
            .get(&slot_id)
            .map(|(_, status)| status.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, call: String) -> DeviceResult<std::sync::MutexGuard<'_, DeviceState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if !state.alive {
            return Err(DeviceError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "device is down",
            )));
        }
        Ok(state)
    }
}

fn no_such_slot(slot_id: u8) -> DeviceError {
    DeviceError::Device {
        code: 2,
        message: format!("no slot {slot_id}"),
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn ping(&self) -> DeviceResult<()> {
        self.enter("ping".into()).map(drop)
    }

    async fn get_slots(&self) -> DeviceResult<Vec<u8>> {
        let state = self.enter("get_slots".into())?;
        Ok(state.slots.keys().copied().collect())
    }

    async fn get_slot(&self, slot_id: u8) -> DeviceResult<Vec<WireTrack>> {
        let state = self.enter(format!("get_slot {slot_id}"))?;
        state
            .slots
            .get(&slot_id)
            .map(|(tracks, _)| tracks.clone())
            .ok_or_else(|| no_such_slot(slot_id))
    }

    async fn get_slot_status(&self, slot_id: u8) -> DeviceResult<SlotStatus> {
        let state = self.enter(format!("get_slot_status {slot_id}"))?;
        if state.failing_slots.contains(&slot_id) {
            return Err(DeviceError::Device {
                code: 5,
                message: "status unavailable".into(),
            });
        }
        state
            .slots
            .get(&slot_id)
            .map(|(_, status)| status.clone())
            .ok_or_else(|| no_such_slot(slot_id))
    }

    async fn create_slot(&self, slot_id: u8, tracks: &[WireTrack]) -> DeviceResult<()> {
        let mut state = self.enter(format!("create_slot {slot_id}"))?;
        state.slots.insert(slot_id, (tracks.to_vec(), SlotStatus::Stopped));
        Ok(())
    }

    async fn remove_slot(&self, slot_id: u8) -> DeviceResult<()> {
        let mut state = self.enter(format!("remove_slot {slot_id}"))?;
        state.slots.remove(&slot_id).map(drop).ok_or_else(|| no_such_slot(slot_id))
    }

    async fn restart_slot(&self, slot_id: u8, start: &SlotStart) -> DeviceResult<()> {
        let mut state = self.enter(format!("restart_slot {slot_id}"))?;
        let (_, status) = state.slots.get_mut(&slot_id).ok_or_else(|| no_such_slot(slot_id))?;
        *status = SlotStatus::Running(RunningSlot {
            signal: 1,
            uptime: 0,
            source1: start.source1,
            source2: start.source2,
            audio_mapping: start.audio_mapping.clone(),
        });
        Ok(())
    }

    async fn stop_slot(&self, slot_id: u8) -> DeviceResult<()> {
        let mut state = self.enter(format!("stop_slot {slot_id}"))?;
        let (_, status) = state.slots.get_mut(&slot_id).ok_or_else(|| no_such_slot(slot_id))?;
        *status = SlotStatus::Stopped;
        Ok(())
    }

    async fn save_config(&self) -> DeviceResult<()> {
        self.enter("save_config".into()).map(drop)
    }

    async fn restart(&self) -> DeviceResult<()> {
        self.enter("restart".into()).map(drop)
    }

    async fn get_net_config(&self) -> DeviceResult<NetConfig> {
        self.enter("get_net_config".into())?;
        Ok(NetConfig {
            address: Ipv4Addr::new(10, 0, 0, 10),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
        })
    }
}

#[async_trait]
impl DeviceProbe for FakeDevice {
    async fn is_alive(&self) -> bool {
        let (alive, crash) = {
            let state = self.state.lock().unwrap();
            (state.alive, state.crash_on_check)
        };
        // the guard is released first so the panic does not poison the state
        if crash {
            panic!("liveness check crashed");
        }
        alive
    }

    async fn load_status(&self) -> Result<LoadStatus, LoadStatusError> {
        self.state
            .lock()
            .unwrap()
            .load
            .clone()
            .ok_or(LoadStatusError::Http(503))
    }
}

/// Hands out fake devices by command port; unknown ports are dead
#[derive(Clone, Default)]
pub struct FakeConnector {
    devices: Arc<Mutex<HashMap<u16, FakeDevice>>>,
}

impl FakeConnector {
    pub fn attach(&self, port: u16, device: FakeDevice) {
        self.devices.lock().unwrap().insert(port, device);
    }

    fn lookup(&self, endpoint: &DeviceEndpoint) -> FakeDevice {
        self.devices
            .lock()
            .unwrap()
            .get(&endpoint.port)
            .cloned()
            .unwrap_or_default()
    }
}

impl Connector for FakeConnector {
    fn api(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceApi> {
        Arc::new(self.lookup(endpoint))
    }

    fn probe(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceProbe> {
        Arc::new(self.lookup(endpoint))
    }
}

/// Collects alerts instead of sending them
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<(DeviceId, bool)>>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<(DeviceId, bool)> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_state_change(&self, device_id: DeviceId, _device_name: &str, alive: bool) {
        self.alerts.lock().unwrap().push((device_id, alive));
    }
}

pub fn test_device(id: DeviceId) -> Device {
    Device {
        id,
        name: format!("encoder-{id}"),
        host: Ipv4Addr::LOCALHOST,
        port: 20000 + id as u16,
        status_port: 21000 + id as u16,
    }
}

/// Periods long enough that only explicit commands drive the monitors
pub fn quiet_settings() -> MonitorSettings {
    MonitorSettings {
        alive_interval: 3600,
        load_interval: 3600,
        stability_threshold: 2,
        load_retries: 1,
        prune_interval: 3600,
        ..MonitorSettings::default()
    }
}

pub fn source_addr(last: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 0, last), port)
}

pub fn two_tracks() -> Vec<WireTrack> {
    vec![WireTrack::new(3, 0, 0), WireTrack::new(110, 2, -3)]
}

pub fn running(source1: SocketAddrV4, source2: SocketAddrV4) -> RunningSlot {
    RunningSlot {
        signal: 1,
        uptime: 120,
        source1,
        source2,
        audio_mapping: vec![1, 2],
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub catalog: Arc<dyn Catalog>,
    pub store: Arc<dyn MetricsStore>,
    pub connector: FakeConnector,
    pub notifier: RecordingNotifier,
}

impl Harness {
    /// Catalog seeded with `test_device(id)` for every id, none started
    pub async fn new(device_ids: &[DeviceId]) -> Self {
        Self::with_store(device_ids, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(device_ids: &[DeviceId], store: Arc<dyn MetricsStore>) -> Self {
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        for id in device_ids {
            catalog.add_device(test_device(*id)).await.unwrap();
        }

        let connector = FakeConnector::default();
        let notifier = RecordingNotifier::default();
        let coordinator = Coordinator::new(
            catalog.clone(),
            store.clone(),
            Arc::new(notifier.clone()),
            Arc::new(connector.clone()),
            quiet_settings(),
        );

        Self {
            coordinator,
            catalog,
            store,
            connector,
            notifier,
        }
    }

    /// Attach a fake to the command port of `test_device(id)`
    pub fn attach(&self, id: DeviceId, device: FakeDevice) {
        self.connector.attach(test_device(id).port, device);
    }
}
