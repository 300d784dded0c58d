//! Building device clients from catalog endpoints
//!
//! Monitors only need a [`DeviceProbe`]; slot management and sync need the
//! full [`DeviceApi`]. A [`Connector`] hands out both so tests can swap in
//! scripted devices.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::client::{DeviceApi, DeviceClient};
use super::error::LoadStatusError;
use super::status::StatusClient;
use crate::LoadStatus;

/// Where a device listens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: Ipv4Addr,
    pub port: u16,
    pub status_port: u16,
}

impl DeviceEndpoint {
    pub fn command_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.host, self.port)
    }
}

/// What a monitor actor asks of its device
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn is_alive(&self) -> bool;

    async fn load_status(&self) -> Result<LoadStatus, LoadStatusError>;
}

/// Command client plus status client for one device
pub struct DeviceLink {
    client: DeviceClient,
    status: StatusClient,
}

impl DeviceLink {
    pub fn new(client: DeviceClient, status: StatusClient) -> Self {
        Self { client, status }
    }
}

#[async_trait]
impl DeviceProbe for DeviceLink {
    async fn is_alive(&self) -> bool {
        self.client.is_alive().await
    }

    async fn load_status(&self) -> Result<LoadStatus, LoadStatusError> {
        self.status.fetch().await
    }
}

/// Factory for device clients
pub trait Connector: Send + Sync {
    fn api(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceApi>;

    fn probe(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceProbe>;
}

/// Connects to real devices over TCP and HTTP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
    load_attempts: u32,
}

impl TcpConnector {
    pub fn new(timeout: Duration, load_attempts: u32) -> Self {
        Self {
            timeout,
            load_attempts,
        }
    }
}

impl Connector for TcpConnector {
    fn api(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceApi> {
        Arc::new(DeviceClient::new(endpoint.command_addr(), self.timeout))
    }

    fn probe(&self, endpoint: &DeviceEndpoint) -> Arc<dyn DeviceProbe> {
        Arc::new(DeviceLink::new(
            DeviceClient::new(endpoint.command_addr(), self.timeout),
            StatusClient::new(endpoint.host, endpoint.status_port, self.timeout, self.load_attempts),
        ))
    }
}
