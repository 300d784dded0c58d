pub mod actors;
pub mod catalog;
pub mod config;
pub mod error;
pub mod monitors;
pub mod notify;
pub mod protocol;
pub mod reconcile;
pub mod slots;
pub mod storage;
pub mod util;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a transcoder device in the configuration catalog.
pub type DeviceId = u32;

/// One load sample read from a device's HTTP status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadStatus {
    /// CPU load in percent
    pub cpu: f64,

    /// Temperature per core in Celsius, keyed by core number
    pub temperatures: BTreeMap<u8, f64>,
}

/// Liveness of a device as seen by its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Unknown,
    Alive,
    Dead,
}

impl Liveness {
    pub fn from_alive(alive: bool) -> Self {
        if alive { Liveness::Alive } else { Liveness::Dead }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }
}

/// Human readable state used in logs and alerts.
pub fn state_label(alive: bool) -> &'static str {
    if alive { "UP" } else { "DOWN" }
}
