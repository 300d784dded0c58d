//! Binary encoding of device commands and responses
//!
//! ## Request
//!
//! ```text
//! +--------+---------------------------+
//! | opcode | fixed-width payload ...   |
//! |  u8    |                           |
//! +--------+---------------------------+
//! ```
//!
//! ## Response
//!
//! ```text
//! +--------+------------+------------------+
//! | status | length     | body (length B)  |
//! |  u8    | u16 LE     |                  |
//! +--------+------------+------------------+
//! ```
//!
//! `status == RET_OK` means the body is the command's payload, any other
//! status means the body is a UTF-8 error message. Integers are
//! little-endian, IPv4 addresses are four bytes in network order.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{DeviceError, DeviceResult};

/// Status code of a successful response
pub const RET_OK: u8 = 1;

/// Length of the response header (status + body length)
pub const HEADER_LEN: usize = 3;

/// Largest response body accepted from a device
pub const MAX_BODY_LEN: usize = 4096;

/// Flags byte sent with `create_slot`
const CREATE_SLOT_FLAGS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    CreateSlot = 1,
    RemoveSlot = 2,
    GetSlot = 3,
    GetSlots = 4,
    RestartSlot = 5,
    StopSlot = 6,
    GetSlotStatus = 7,
    SaveConfig = 8,
    Restart = 9,
    GetNetConfig = 10,
    IsAlive = 11,
}

impl TryFrom<u8> for Opcode {
    type Error = DeviceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Opcode::CreateSlot,
            2 => Opcode::RemoveSlot,
            3 => Opcode::GetSlot,
            4 => Opcode::GetSlots,
            5 => Opcode::RestartSlot,
            6 => Opcode::StopSlot,
            7 => Opcode::GetSlotStatus,
            8 => Opcode::SaveConfig,
            9 => Opcode::Restart,
            10 => Opcode::GetNetConfig,
            11 => Opcode::IsAlive,
            other => return Err(DeviceError::Malformed(format!("unknown opcode {other}"))),
        })
    }
}

/// Track as the device sees it: `(profile, channels, gain, 0)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireTrack {
    pub profile_number: u8,
    pub num_channels: u8,
    pub gain: i8,
}

impl WireTrack {
    pub const ENCODED_LEN: usize = 4;

    pub fn new(profile_number: u8, num_channels: u8, gain: i8) -> Self {
        Self {
            profile_number,
            num_channels,
            gain,
        }
    }

    /// The comparison tuple used for preset matching
    pub fn as_tuple(&self) -> (u8, u8, i8, u8) {
        (self.profile_number, self.num_channels, self.gain, 0)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.profile_number);
        buf.put_u8(self.num_channels);
        buf.put_i8(self.gain);
        buf.put_u8(0);
    }

    fn decode(buf: &mut Bytes) -> DeviceResult<Self> {
        ensure_remaining(buf, Self::ENCODED_LEN, "track")?;
        let track = Self::new(buf.get_u8(), buf.get_u8(), buf.get_i8());
        buf.advance(1);
        Ok(track)
    }
}

/// Source endpoints and audio mapping used to (re)start a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStart {
    pub source1: SocketAddrV4,
    pub source2: SocketAddrV4,
    pub audio_mapping: Vec<u8>,
}

/// Live state of a slot as reported by `get_slot_status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    Stopped,
    Running(RunningSlot),
}

impl SlotStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SlotStatus::Running(_))
    }

    pub fn message(&self) -> &'static str {
        match self {
            SlotStatus::Stopped => "Slot is stopped",
            SlotStatus::Running(_) => "Slot is running",
        }
    }
}

/// Detail reported for a running slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningSlot {
    /// Input signal quality, 0-100
    pub signal: u8,

    /// Seconds since the slot was started
    pub uptime: u32,

    pub source1: SocketAddrV4,
    pub source2: SocketAddrV4,

    /// Audio track mapping currently applied
    pub audio_mapping: Vec<u8>,
}

/// Network configuration reported by `get_net_config`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// One command sent to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSlot { slot_id: u8, tracks: Vec<WireTrack> },
    RemoveSlot { slot_id: u8 },
    GetSlot { slot_id: u8 },
    GetSlots,
    RestartSlot { slot_id: u8, start: SlotStart },
    StopSlot { slot_id: u8 },
    GetSlotStatus { slot_id: u8 },
    SaveConfig,
    Restart,
    GetNetConfig,
    IsAlive,
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::CreateSlot { .. } => Opcode::CreateSlot,
            Request::RemoveSlot { .. } => Opcode::RemoveSlot,
            Request::GetSlot { .. } => Opcode::GetSlot,
            Request::GetSlots => Opcode::GetSlots,
            Request::RestartSlot { .. } => Opcode::RestartSlot,
            Request::StopSlot { .. } => Opcode::StopSlot,
            Request::GetSlotStatus { .. } => Opcode::GetSlotStatus,
            Request::SaveConfig => Opcode::SaveConfig,
            Request::Restart => Opcode::Restart,
            Request::GetNetConfig => Opcode::GetNetConfig,
            Request::IsAlive => Opcode::IsAlive,
        }
    }

    pub fn encode(&self) -> DeviceResult<Bytes> {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(self.opcode() as u8);

        match self {
            Request::CreateSlot { slot_id, tracks } => {
                buf.put_u8(*slot_id);
                buf.put_u8(CREATE_SLOT_FLAGS);
                buf.put_u8(count_byte(tracks.len(), "tracks")?);
                for track in tracks {
                    track.encode(&mut buf);
                }
            }
            Request::RemoveSlot { slot_id }
            | Request::GetSlot { slot_id }
            | Request::StopSlot { slot_id }
            | Request::GetSlotStatus { slot_id } => buf.put_u8(*slot_id),
            Request::RestartSlot { slot_id, start } => {
                buf.put_u8(*slot_id);
                put_endpoint(&mut buf, &start.source1);
                put_endpoint(&mut buf, &start.source2);
                buf.put_u8(count_byte(start.audio_mapping.len(), "audio mapping")?);
                buf.put_slice(&start.audio_mapping);
            }
            Request::GetSlots
            | Request::SaveConfig
            | Request::Restart
            | Request::GetNetConfig
            | Request::IsAlive => {}
        }

        Ok(buf.freeze())
    }

    /// Inverse of [`Request::encode`], used by device simulators
    pub fn decode(mut buf: Bytes) -> DeviceResult<Self> {
        ensure_remaining(&buf, 1, "opcode")?;
        let opcode = Opcode::try_from(buf.get_u8())?;

        let request = match opcode {
            Opcode::CreateSlot => {
                let slot_id = take_u8(&mut buf, "slot id")?;
                let _flags = take_u8(&mut buf, "flags")?;
                let count = take_u8(&mut buf, "track count")?;
                let tracks = (0..count)
                    .map(|_| WireTrack::decode(&mut buf))
                    .collect::<DeviceResult<_>>()?;
                Request::CreateSlot { slot_id, tracks }
            }
            Opcode::RemoveSlot => Request::RemoveSlot { slot_id: take_u8(&mut buf, "slot id")? },
            Opcode::GetSlot => Request::GetSlot { slot_id: take_u8(&mut buf, "slot id")? },
            Opcode::GetSlots => Request::GetSlots,
            Opcode::RestartSlot => {
                let slot_id = take_u8(&mut buf, "slot id")?;
                let source1 = take_endpoint(&mut buf)?;
                let source2 = take_endpoint(&mut buf)?;
                let audio_mapping = take_counted_bytes(&mut buf, "audio mapping")?;
                Request::RestartSlot {
                    slot_id,
                    start: SlotStart {
                        source1,
                        source2,
                        audio_mapping,
                    },
                }
            }
            Opcode::StopSlot => Request::StopSlot { slot_id: take_u8(&mut buf, "slot id")? },
            Opcode::GetSlotStatus => Request::GetSlotStatus { slot_id: take_u8(&mut buf, "slot id")? },
            Opcode::SaveConfig => Request::SaveConfig,
            Opcode::Restart => Request::Restart,
            Opcode::GetNetConfig => Request::GetNetConfig,
            Opcode::IsAlive => Request::IsAlive,
        };

        Ok(request)
    }
}

/// Split a response header into (status, body length)
pub fn parse_header(header: [u8; HEADER_LEN]) -> DeviceResult<(u8, usize)> {
    let status = header[0];
    let len = u16::from_le_bytes([header[1], header[2]]) as usize;
    if len > MAX_BODY_LEN {
        return Err(DeviceError::Malformed(format!(
            "announced body of {len} bytes exceeds {MAX_BODY_LEN}"
        )));
    }
    Ok((status, len))
}

/// Turn a complete response into its body, or the device's error
pub fn check_status(status: u8, body: Bytes) -> DeviceResult<Bytes> {
    if status == RET_OK {
        Ok(body)
    } else {
        Err(DeviceError::Device {
            code: status,
            message: String::from_utf8_lossy(&body).trim().to_string(),
        })
    }
}

/// Build a response frame, used by device simulators
///
/// Bodies over [`MAX_BODY_LEN`] are rejected, the same bound the client
/// enforces when reading.
pub fn encode_response(status: u8, body: &[u8]) -> DeviceResult<Bytes> {
    if body.len() > MAX_BODY_LEN {
        return Err(DeviceError::Malformed(format!(
            "response body of {} bytes exceeds {MAX_BODY_LEN}",
            body.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u8(status);
    buf.put_u16_le(body.len() as u16);
    buf.put_slice(body);
    Ok(buf.freeze())
}

pub fn decode_slot_ids(mut body: Bytes) -> DeviceResult<Vec<u8>> {
    take_counted_bytes(&mut body, "slot ids")
}

pub fn encode_slot_ids(slot_ids: &[u8]) -> DeviceResult<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(response_count(slot_ids.len(), "slot ids")?);
    buf.put_slice(slot_ids);
    Ok(buf.freeze())
}

pub fn decode_tracks(mut body: Bytes) -> DeviceResult<Vec<WireTrack>> {
    let count = take_u8(&mut body, "track count")?;
    (0..count).map(|_| WireTrack::decode(&mut body)).collect()
}

pub fn encode_tracks(tracks: &[WireTrack]) -> DeviceResult<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(response_count(tracks.len(), "tracks")?);
    for track in tracks {
        track.encode(&mut buf);
    }
    Ok(buf.freeze())
}

pub fn decode_slot_status(mut body: Bytes) -> DeviceResult<SlotStatus> {
    match take_u8(&mut body, "running flag")? {
        0 => Ok(SlotStatus::Stopped),
        1 => {
            let signal = take_u8(&mut body, "signal")?;
            ensure_remaining(&body, 4, "uptime")?;
            let uptime = body.get_u32_le();
            let source1 = take_endpoint(&mut body)?;
            let source2 = take_endpoint(&mut body)?;
            let audio_mapping = take_counted_bytes(&mut body, "audio mapping")?;
            Ok(SlotStatus::Running(RunningSlot {
                signal,
                uptime,
                source1,
                source2,
                audio_mapping,
            }))
        }
        other => Err(DeviceError::Malformed(format!("invalid running flag {other}"))),
    }
}

pub fn encode_slot_status(status: &SlotStatus) -> DeviceResult<Bytes> {
    let mut buf = BytesMut::new();
    match status {
        SlotStatus::Stopped => buf.put_u8(0),
        SlotStatus::Running(running) => {
            buf.put_u8(1);
            buf.put_u8(running.signal);
            buf.put_u32_le(running.uptime);
            put_endpoint(&mut buf, &running.source1);
            put_endpoint(&mut buf, &running.source2);
            buf.put_u8(response_count(running.audio_mapping.len(), "audio mapping entries")?);
            buf.put_slice(&running.audio_mapping);
        }
    }
    Ok(buf.freeze())
}

pub fn decode_net_config(mut body: Bytes) -> DeviceResult<NetConfig> {
    Ok(NetConfig {
        address: take_ipv4(&mut body, "address")?,
        netmask: take_ipv4(&mut body, "netmask")?,
        gateway: take_ipv4(&mut body, "gateway")?,
    })
}

pub fn encode_net_config(config: &NetConfig) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(&config.address.octets());
    buf.put_slice(&config.netmask.octets());
    buf.put_slice(&config.gateway.octets());
    buf.freeze()
}

fn count_byte(len: usize, what: &str) -> DeviceResult<u8> {
    u8::try_from(len).map_err(|_| DeviceError::InvalidRequest(format!("too many {what}: {len}")))
}

fn response_count(len: usize, what: &str) -> DeviceResult<u8> {
    u8::try_from(len).map_err(|_| DeviceError::Malformed(format!("too many {what} for one response: {len}")))
}

fn put_endpoint(buf: &mut BytesMut, endpoint: &SocketAddrV4) {
    buf.put_slice(&endpoint.ip().octets());
    buf.put_u16_le(endpoint.port());
}

fn ensure_remaining(buf: &Bytes, needed: usize, field: &str) -> DeviceResult<()> {
    if buf.remaining() < needed {
        return Err(DeviceError::Malformed(format!(
            "body too short for {field}: need {needed} bytes, {} left",
            buf.remaining()
        )));
    }
    Ok(())
}

fn take_u8(buf: &mut Bytes, field: &str) -> DeviceResult<u8> {
    ensure_remaining(buf, 1, field)?;
    Ok(buf.get_u8())
}

fn take_ipv4(buf: &mut Bytes, field: &str) -> DeviceResult<Ipv4Addr> {
    ensure_remaining(buf, 4, field)?;
    let mut octets = [0u8; 4];
    buf.copy_to_slice(&mut octets);
    Ok(Ipv4Addr::from(octets))
}

fn take_endpoint(buf: &mut Bytes) -> DeviceResult<SocketAddrV4> {
    let ip = take_ipv4(buf, "source address")?;
    ensure_remaining(buf, 2, "source port")?;
    Ok(SocketAddrV4::new(ip, buf.get_u16_le()))
}

fn take_counted_bytes(buf: &mut Bytes, field: &str) -> DeviceResult<Vec<u8>> {
    let count = take_u8(buf, field)? as usize;
    ensure_remaining(buf, count, field)?;
    Ok(buf.split_to(count).to_vec())
}
