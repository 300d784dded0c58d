//! TCP client for the device command protocol
//!
//! Every call opens a fresh connection, writes one request, reads one
//! response and closes. The client never retries; callers decide what to
//! do with a transport failure.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use super::codec::{self, HEADER_LEN, NetConfig, Request, SlotStart, SlotStatus, WireTrack};
use super::error::{DeviceError, DeviceResult};

/// Operations a transcoder device understands, one round trip each
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Bare liveness round trip
    async fn ping(&self) -> DeviceResult<()>;

    /// Ids of the slots that exist on the device
    async fn get_slots(&self) -> DeviceResult<Vec<u8>>;

    /// Track list the slot was created with
    async fn get_slot(&self, slot_id: u8) -> DeviceResult<Vec<WireTrack>>;

    async fn get_slot_status(&self, slot_id: u8) -> DeviceResult<SlotStatus>;

    async fn create_slot(&self, slot_id: u8, tracks: &[WireTrack]) -> DeviceResult<()>;

    async fn remove_slot(&self, slot_id: u8) -> DeviceResult<()>;

    /// Start (or restart) a slot reading from the given sources
    async fn restart_slot(&self, slot_id: u8, start: &SlotStart) -> DeviceResult<()>;

    async fn stop_slot(&self, slot_id: u8) -> DeviceResult<()>;

    /// Persist the running slot configuration on the device
    async fn save_config(&self) -> DeviceResult<()>;

    /// Reboot the device
    async fn restart(&self) -> DeviceResult<()>;

    async fn get_net_config(&self) -> DeviceResult<NetConfig>;

    /// `ping` collapsed to a bool; any failure counts as not alive
    async fn is_alive(&self) -> bool {
        self.ping().await.is_ok()
    }
}

/// Device protocol client over TCP
#[derive(Debug, Clone)]
pub struct DeviceClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(addr: impl Into<SocketAddr>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one request and return the success body
    #[instrument(level = "debug", skip_all, fields(addr = %self.addr, op = ?request.opcode()))]
    async fn call(&self, request: Request) -> DeviceResult<Bytes> {
        let payload = request.encode()?;

        let (status, body) = tokio::time::timeout(self.timeout, self.round_trip(&payload))
            .await
            .map_err(|_| DeviceError::Timeout)??;

        trace!("status {status}, {} body bytes", body.len());
        codec::check_status(status, body)
    }

    async fn round_trip(&self, payload: &[u8]) -> DeviceResult<(u8, Bytes)> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;

        let mut header = [0u8; HEADER_LEN];
        read_full(&mut stream, &mut header).await?;
        let (status, len) = codec::parse_header(header)?;

        let mut body = vec![0u8; len];
        read_full(&mut stream, &mut body).await?;

        Ok((status, Bytes::from(body)))
    }
}

/// Fill `buf` completely, reporting how far we got if the peer hangs up
async fn read_full(stream: &mut TcpStream, buf: &mut [u8]) -> DeviceResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(DeviceError::Truncated {
                expected: buf.len(),
                got: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn ping(&self) -> DeviceResult<()> {
        self.call(Request::IsAlive).await.map(drop)
    }

    async fn get_slots(&self) -> DeviceResult<Vec<u8>> {
        codec::decode_slot_ids(self.call(Request::GetSlots).await?)
    }

    async fn get_slot(&self, slot_id: u8) -> DeviceResult<Vec<WireTrack>> {
        codec::decode_tracks(self.call(Request::GetSlot { slot_id }).await?)
    }

    async fn get_slot_status(&self, slot_id: u8) -> DeviceResult<SlotStatus> {
        codec::decode_slot_status(self.call(Request::GetSlotStatus { slot_id }).await?)
    }

    async fn create_slot(&self, slot_id: u8, tracks: &[WireTrack]) -> DeviceResult<()> {
        self.call(Request::CreateSlot {
            slot_id,
            tracks: tracks.to_vec(),
        })
        .await
        .map(drop)
    }

    async fn remove_slot(&self, slot_id: u8) -> DeviceResult<()> {
        self.call(Request::RemoveSlot { slot_id }).await.map(drop)
    }

    async fn restart_slot(&self, slot_id: u8, start: &SlotStart) -> DeviceResult<()> {
        self.call(Request::RestartSlot {
            slot_id,
            start: start.clone(),
        })
        .await
        .map(drop)
    }

    async fn stop_slot(&self, slot_id: u8) -> DeviceResult<()> {
        self.call(Request::StopSlot { slot_id }).await.map(drop)
    }

    async fn save_config(&self) -> DeviceResult<()> {
        self.call(Request::SaveConfig).await.map(drop)
    }

    async fn restart(&self) -> DeviceResult<()> {
        self.call(Request::Restart).await.map(drop)
    }

    async fn get_net_config(&self) -> DeviceResult<NetConfig> {
        codec::decode_net_config(self.call(Request::GetNetConfig).await?)
    }
}
