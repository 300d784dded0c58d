//! Per-device state tracking fed by the monitor actors

pub mod liveness;
