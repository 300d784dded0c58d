//! Device-facing protocols: the binary command protocol over TCP and the
//! JSON load-status endpoint over HTTP.

pub mod client;
pub mod codec;
pub mod error;
pub mod link;
pub mod status;

pub use client::{DeviceApi, DeviceClient};
pub use codec::{NetConfig, RET_OK, Request, RunningSlot, SlotStart, SlotStatus, WireTrack};
pub use error::{DeviceError, DeviceResult, LoadStatusError};
pub use link::{Connector, DeviceEndpoint, DeviceLink, DeviceProbe, TcpConnector};
pub use status::{StatusClient, parse_load_status};
