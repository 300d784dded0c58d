//! Match-or-create resolution of live device state against the catalog
//!
//! Each entity kind knows how to compare itself with a lookup key and how
//! to build a placeholder from that key. Placeholders get an `unknown_`
//! name so operators can tell them apart from their own entities.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Catalog;
use super::error::{CatalogError, CatalogResult};
use super::model::{Capture, EntityId, EntityKind, Preset, Scheme, Source, Track};
use crate::protocol::{RunningSlot, WireTrack};
use crate::util::placeholder_name;

/// Equality rule and placeholder construction for one entity kind
pub trait EntityMatch: Sized {
    type Key;

    const KIND: EntityKind;

    fn matches(&self, key: &Self::Key) -> bool;

    fn placeholder(key: &Self::Key) -> Self;
}

pub fn find_match<'a, E: EntityMatch>(existing: &'a [E], key: &E::Key) -> Option<&'a E> {
    existing.iter().find(|entity| entity.matches(key))
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureKey {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl EntityMatch for Capture {
    type Key = CaptureKey;

    const KIND: EntityKind = EntityKind::Capture;

    fn matches(&self, key: &CaptureKey) -> bool {
        self.host == key.host && self.is_mapped(key.port)
    }

    fn placeholder(key: &CaptureKey) -> Self {
        let mut capture = Capture::new(placeholder_name(Self::KIND.as_str()), key.host);
        capture.inputs[0] = key.port;
        capture
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceKey {
    pub capture_id: EntityId,
    pub input: u8,
}

impl EntityMatch for Source {
    type Key = SourceKey;

    const KIND: EntityKind = EntityKind::Source;

    fn matches(&self, key: &SourceKey) -> bool {
        self.capture_id == key.capture_id && self.input == key.input
    }

    fn placeholder(key: &SourceKey) -> Self {
        Source {
            id: 0,
            name: placeholder_name(Self::KIND.as_str()),
            capture_id: key.capture_id,
            input: key.input,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PresetKey {
    pub tracks: Vec<WireTrack>,
}

impl EntityMatch for Preset {
    type Key = PresetKey;

    const KIND: EntityKind = EntityKind::Preset;

    fn matches(&self, key: &PresetKey) -> bool {
        self.has_tracks(&key.tracks)
    }

    fn placeholder(key: &PresetKey) -> Self {
        Preset {
            id: 0,
            name: placeholder_name(Self::KIND.as_str()),
            tracks: key.tracks.iter().copied().map(Track::from).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemeKey {
    pub preset_id: EntityId,
    pub source1_id: EntityId,
    pub source2_id: EntityId,
    pub audio_mapping: Vec<u8>,
}

impl EntityMatch for Scheme {
    type Key = SchemeKey;

    const KIND: EntityKind = EntityKind::Scheme;

    /// A scheme without a second source matches a key whose legs agree
    fn matches(&self, key: &SchemeKey) -> bool {
        self.preset_id == key.preset_id
            && self.source1_id == key.source1_id
            && self.effective_source2() == key.source2_id
            && self.audio_mapping == key.audio_mapping
    }

    fn placeholder(key: &SchemeKey) -> Self {
        Scheme {
            id: 0,
            name: placeholder_name(Self::KIND.as_str()),
            preset_id: key.preset_id,
            source1_id: key.source1_id,
            source2_id: (key.source2_id != key.source1_id).then_some(key.source2_id),
            audio_mapping: key.audio_mapping.clone(),
        }
    }
}

/// Capture at `host` carrying `port`, and the input the port is on
///
/// Prefers a capture that already maps the port, then the first capture
/// at that host with a free input, then a new placeholder capture.
pub async fn match_or_create_capture(
    catalog: &dyn Catalog,
    host: Ipv4Addr,
    port: u16,
) -> CatalogResult<(Capture, u8)> {
    if port == 0 {
        return Err(CatalogError::Validation {
            kind: EntityKind::Capture,
            reason: format!("cannot map port 0 on {host}"),
        });
    }

    let key = CaptureKey { host, port };
    let captures = catalog.captures().await?;

    if let Some(found) = find_match(&captures, &key)
        .and_then(|capture| capture.input_for(port).map(|input| (capture.clone(), input)))
    {
        return Ok(found);
    }

    if let Some(mut capture) = captures
        .into_iter()
        .find(|capture| capture.host == host && capture.has_free_input())
    {
        let input = capture.add_port(port)?;
        let capture = catalog.update_capture(capture).await?;
        debug!("mapped {host}:{port} to input {input} of capture {}", capture.name);
        return Ok((capture, input));
    }

    let capture = catalog.create_capture(Capture::placeholder(&key)).await?;
    info!("created capture {} for {host}:{port}", capture.name);
    Ok((capture, 1))
}

pub async fn match_or_create_source(
    catalog: &dyn Catalog,
    endpoint: SocketAddrV4,
) -> CatalogResult<Source> {
    let (capture, input) = match_or_create_capture(catalog, *endpoint.ip(), endpoint.port()).await?;
    let key = SourceKey {
        capture_id: capture.id,
        input,
    };

    if let Some(source) = find_match(&catalog.sources().await?, &key) {
        return Ok(source.clone());
    }

    let source = catalog.create_source(Source::placeholder(&key)).await?;
    info!("created source {} for {endpoint}", source.name);
    Ok(source)
}

pub async fn match_or_create_preset(
    catalog: &dyn Catalog,
    tracks: &[WireTrack],
) -> CatalogResult<Preset> {
    let key = PresetKey {
        tracks: tracks.to_vec(),
    };

    if let Some(preset) = find_match(&catalog.presets().await?, &key) {
        return Ok(preset.clone());
    }

    let preset = catalog.create_preset(Preset::placeholder(&key)).await?;
    info!("created preset {} with {} tracks", preset.name, tracks.len());
    Ok(preset)
}

/// Scheme for a running slot, resolving its preset and both sources first
pub async fn match_or_create_scheme(
    catalog: &dyn Catalog,
    tracks: &[WireTrack],
    running: &RunningSlot,
) -> CatalogResult<Scheme> {
    let source1 = match_or_create_source(catalog, running.source1).await?;
    let source2 = match_or_create_source(catalog, running.source2).await?;
    let preset = match_or_create_preset(catalog, tracks).await?;

    let key = SchemeKey {
        preset_id: preset.id,
        source1_id: source1.id,
        source2_id: source2.id,
        audio_mapping: running.audio_mapping.clone(),
    };

    if let Some(scheme) = find_match(&catalog.schemes().await?, &key) {
        return Ok(scheme.clone());
    }

    let scheme = catalog.create_scheme(Scheme::placeholder(&key)).await?;
    info!("created scheme {} for preset {}", scheme.name, preset.name);
    Ok(scheme)
}

/// Serializes match-or-create runs against one catalog
///
/// Two devices reporting the same unknown source at once must not both
/// create a placeholder for it.
pub struct Resolver {
    catalog: Arc<dyn Catalog>,
    lock: Mutex<()>,
}

impl Resolver {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            lock: Mutex::new(()),
        }
    }

    pub async fn resolve_scheme(
        &self,
        tracks: &[WireTrack],
        running: &RunningSlot,
    ) -> CatalogResult<Scheme> {
        let _guard = self.lock.lock().await;
        match_or_create_scheme(self.catalog.as_ref(), tracks, running).await
    }
}
