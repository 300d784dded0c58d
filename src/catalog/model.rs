//! Configuration entities and their validation rules

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};
use crate::DeviceId;
use crate::protocol::{DeviceEndpoint, WireTrack};

/// Identifier of a catalog entity other than a device
pub type EntityId = u32;

/// Number of inputs on a capture
pub const CAPTURE_INPUTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Device,
    Slot,
    Capture,
    Source,
    Preset,
    Scheme,
    Track,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::Slot => "slot",
            EntityKind::Capture => "capture",
            EntityKind::Source => "source",
            EntityKind::Preset => "preset",
            EntityKind::Scheme => "scheme",
            EntityKind::Track => "track",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid(kind: EntityKind, reason: impl Into<String>) -> CatalogError {
    CatalogError::Validation {
        kind,
        reason: reason.into(),
    }
}

fn require_name(kind: EntityKind, name: &str) -> CatalogResult<()> {
    if name.trim().is_empty() {
        return Err(invalid(kind, "name must not be empty"));
    }
    Ok(())
}

/// A transcoder unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub host: Ipv4Addr,
    pub port: u16,
    pub status_port: u16,
}

impl Device {
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint {
            host: self.host,
            port: self.port,
            status_port: self.status_port,
        }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        require_name(EntityKind::Device, &self.name)?;
        if self.port == 0 {
            return Err(invalid(EntityKind::Device, "port must be in 1..=65535"));
        }
        if self.status_port == 0 {
            return Err(invalid(EntityKind::Device, "status port must be in 1..=65535"));
        }
        Ok(())
    }
}

impl From<&crate::config::DeviceConfig> for Device {
    fn from(config: &crate::config::DeviceConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            host: config.host,
            port: config.port,
            status_port: config.status_port,
        }
    }
}

/// One hardware transcoding channel of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub device_id: DeviceId,
    pub slot_id: u8,
    pub scheme_id: Option<EntityId>,
}

impl Slot {
    /// A slot with no scheme bound
    pub fn bare(device_id: DeviceId, slot_id: u8) -> Self {
        Self {
            device_id,
            slot_id,
            scheme_id: None,
        }
    }
}

/// Video or audio encoding profile of one track
///
/// Video tracks have zero channels, zero gain and a profile in 1..=100.
/// Audio tracks have one or two channels and a profile in 101..=254.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    pub profile_number: u8,
    pub num_channels: u8,
    pub gain: i8,
}

impl Track {
    pub fn video(profile_number: u8) -> Self {
        Self {
            profile_number,
            num_channels: 0,
            gain: 0,
        }
    }

    pub fn audio(profile_number: u8, num_channels: u8, gain: i8) -> Self {
        Self {
            profile_number,
            num_channels,
            gain,
        }
    }

    pub fn is_video(&self) -> bool {
        self.num_channels == 0
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if !(1..=254).contains(&self.profile_number) {
            return Err(invalid(EntityKind::Track, "profile number must be in 1..=254"));
        }
        if self.num_channels > 2 {
            return Err(invalid(EntityKind::Track, "channel count must be 0, 1 or 2"));
        }
        if self.is_video() {
            if self.gain != 0 {
                return Err(invalid(EntityKind::Track, "gain must be 0 for video"));
            }
            if self.profile_number > 100 {
                return Err(invalid(EntityKind::Track, "video profile must be in 1..=100"));
            }
        } else if self.profile_number < 101 {
            return Err(invalid(EntityKind::Track, "audio profile must be in 101..=254"));
        }
        Ok(())
    }

    pub fn to_wire(&self) -> WireTrack {
        WireTrack::new(self.profile_number, self.num_channels, self.gain)
    }
}

impl From<WireTrack> for Track {
    fn from(track: WireTrack) -> Self {
        Self {
            profile_number: track.profile_number,
            num_channels: track.num_channels,
            gain: track.gain,
        }
    }
}

/// Ordered list of tracks a slot is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: EntityId,
    pub name: String,
    pub tracks: Vec<Track>,
}

impl Preset {
    pub fn validate(&self) -> CatalogResult<()> {
        require_name(EntityKind::Preset, &self.name)?;
        self.tracks.iter().try_for_each(Track::validate)
    }

    pub fn wire_tracks(&self) -> Vec<WireTrack> {
        self.tracks.iter().map(Track::to_wire).collect()
    }

    /// Element-wise equality of the `(profile, channels, gain, 0)` tuples
    pub fn has_tracks(&self, tracks: &[WireTrack]) -> bool {
        self.tracks.len() == tracks.len()
            && self
                .tracks
                .iter()
                .zip(tracks)
                .all(|(own, live)| own.to_wire().as_tuple() == live.as_tuple())
    }
}

/// Physical input device with four numbered inputs
///
/// An input holding 0 is unmapped. A port appears on at most one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub id: EntityId,
    pub name: String,
    pub host: Ipv4Addr,
    pub inputs: [u16; CAPTURE_INPUTS],
}

impl Capture {
    pub fn new(name: impl Into<String>, host: Ipv4Addr) -> Self {
        Self {
            id: 0,
            name: name.into(),
            host,
            inputs: [0; CAPTURE_INPUTS],
        }
    }

    /// Port mapped to `input` (1-based), if any
    pub fn port(&self, input: u8) -> Option<u16> {
        let index = usize::from(input).checked_sub(1)?;
        self.inputs.get(index).copied().filter(|port| *port != 0)
    }

    /// Input (1-based) carrying `port`
    pub fn input_for(&self, port: u16) -> Option<u8> {
        if port == 0 {
            return None;
        }
        self.inputs
            .iter()
            .position(|mapped| *mapped == port)
            .map(|index| index as u8 + 1)
    }

    pub fn is_mapped(&self, port: u16) -> bool {
        self.input_for(port).is_some()
    }

    pub fn has_free_input(&self) -> bool {
        self.inputs.contains(&0)
    }

    /// Map `port` to the first free input and return that input
    ///
    /// Mapping a port that is already present returns its input unchanged.
    pub fn add_port(&mut self, port: u16) -> CatalogResult<u8> {
        if port == 0 {
            return Err(invalid(EntityKind::Capture, "port must be in 1..=65535"));
        }
        if let Some(input) = self.input_for(port) {
            return Ok(input);
        }

        let index = self
            .inputs
            .iter()
            .position(|mapped| *mapped == 0)
            .ok_or(CatalogError::CaptureFull { capture_id: self.id })?;
        self.inputs[index] = port;
        Ok(index as u8 + 1)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        require_name(EntityKind::Capture, &self.name)?;
        let mapped: Vec<_> = self.inputs.iter().filter(|port| **port != 0).collect();
        for (i, port) in mapped.iter().enumerate() {
            if mapped[i + 1..].contains(port) {
                return Err(invalid(
                    EntityKind::Capture,
                    format!("port {port} is mapped to more than one input"),
                ));
            }
        }
        Ok(())
    }
}

/// One input of one capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: EntityId,
    pub name: String,
    pub capture_id: EntityId,
    pub input: u8,
}

impl Source {
    /// Checks that need the owning capture
    pub fn validate(&self, capture: &Capture) -> CatalogResult<()> {
        require_name(EntityKind::Source, &self.name)?;
        if !(1..=CAPTURE_INPUTS as u8).contains(&self.input) {
            return Err(invalid(EntityKind::Source, "input must be in 1..=4"));
        }
        if capture.port(self.input).is_none() {
            return Err(invalid(
                EntityKind::Source,
                format!("input {} of capture {} is not mapped", self.input, capture.name),
            ));
        }
        Ok(())
    }

    /// Concrete host:port this source reads from
    pub fn endpoint(&self, capture: &Capture) -> CatalogResult<SocketAddrV4> {
        capture
            .port(self.input)
            .map(|port| SocketAddrV4::new(capture.host, port))
            .ok_or_else(|| {
                invalid(
                    EntityKind::Source,
                    format!("input {} of capture {} is not mapped", self.input, capture.name),
                )
            })
    }
}

/// A preset fed by one or two sources with an audio mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheme {
    pub id: EntityId,
    pub name: String,
    pub preset_id: EntityId,
    pub source1_id: EntityId,
    pub source2_id: Option<EntityId>,
    pub audio_mapping: Vec<u8>,
}

impl Scheme {
    /// Second leg of the device call; the first source when only one is set
    pub fn effective_source2(&self) -> EntityId {
        self.source2_id.unwrap_or(self.source1_id)
    }

    /// Checks that need the referenced preset
    pub fn validate(&self, preset: &Preset) -> CatalogResult<()> {
        require_name(EntityKind::Scheme, &self.name)?;
        let track_count = preset.tracks.len();
        if self.audio_mapping.len() < track_count {
            return Err(invalid(
                EntityKind::Scheme,
                format!(
                    "audio mapping has {} entries, preset has {track_count} tracks",
                    self.audio_mapping.len()
                ),
            ));
        }
        if let Some(entry) = self
            .audio_mapping
            .iter()
            .find(|entry| usize::from(**entry) > track_count)
        {
            return Err(invalid(
                EntityKind::Scheme,
                format!("audio mapping entry {entry} exceeds track count {track_count}"),
            ));
        }
        Ok(())
    }
}
