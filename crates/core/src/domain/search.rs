//! Device search
//!
//! Composes filtering, topology resolution and volume snapshots into a single
//! pass over the catalog.

use crate::domain::audio::{AudioDevice, DeviceCatalog, ParseError, Result, SerialPort};
use crate::domain::filter::{self, AudioFilter, Matched, PortFilter};
use crate::domain::mixer::VolumeInfo;
use crate::domain::topology::{self, DeviceDescription};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// How audio devices and serial ports relate in a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Filter audio devices and serial ports separately
    #[default]
    Independent,
    /// Filter audio devices, then look for serial ports next to them
    #[serde(alias = "audio-siblings")]
    AudioSiblings,
    /// Filter serial ports, then look for audio devices next to them
    #[serde(alias = "port-siblings")]
    PortSiblings,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Independent => f.write_str("independent"),
            SearchMode::AudioSiblings => f.write_str("audio-siblings"),
            SearchMode::PortSiblings => f.write_str("port-siblings"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "independent" => Ok(SearchMode::Independent),
            "audio-siblings" => Ok(SearchMode::AudioSiblings),
            "port-siblings" => Ok(SearchMode::PortSiblings),
            _ => Err(ParseError::new("search mode", s)),
        }
    }
}

/// Which device kinds a result carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludedDevices {
    Audio,
    Ports,
    #[default]
    All,
}

impl IncludedDevices {
    pub fn audio(self) -> bool {
        matches!(self, IncludedDevices::Audio | IncludedDevices::All)
    }

    pub fn ports(self) -> bool {
        matches!(self, IncludedDevices::Ports | IncludedDevices::All)
    }
}

impl FromStr for IncludedDevices {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(IncludedDevices::Audio),
            "ports" => Ok(IncludedDevices::Ports),
            "all" => Ok(IncludedDevices::All),
            _ => Err(ParseError::new("included devices", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub audio: AudioFilter,
    pub port: PortFilter,
}

/// A matched audio device with its mixer snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioMatch {
    #[serde(flatten)]
    pub device: AudioDevice,
    #[serde(flatten)]
    pub description: Option<DeviceDescription>,
    pub volume: VolumeInfo,
}

pub type PortMatch = Matched<SerialPort>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub audio_devices: Vec<AudioMatch>,
    pub serial_ports: Vec<PortMatch>,
}

impl SearchResult {
    pub fn volumes(&self) -> Vec<VolumeInfo> {
        self.audio_devices.iter().map(|m| m.volume.clone()).collect()
    }

    /// Drop the device kinds not asked for
    pub fn restrict(mut self, included: IncludedDevices) -> Self {
        if !included.audio() {
            self.audio_devices.clear();
        }
        if !included.ports() {
            self.serial_ports.clear();
        }
        self
    }

    /// Audio devices and ports each form one result set; the larger one counts
    pub fn result_count(&self) -> usize {
        self.audio_devices.len().max(self.serial_ports.len())
    }

    pub fn is_empty(&self) -> bool {
        self.audio_devices.is_empty() && self.serial_ports.is_empty()
    }

    /// Re-read every device's mixer, e.g. after applying volumes
    pub fn refresh_volumes(&mut self, catalog: &dyn DeviceCatalog) {
        for m in &mut self.audio_devices {
            m.volume = fetch_volume(catalog, &m.device);
        }
    }
}

fn fetch_volume(catalog: &dyn DeviceCatalog, device: &AudioDevice) -> VolumeInfo {
    VolumeInfo::fetch(catalog, device).unwrap_or_else(|e| {
        warn!(device = %device.hw_id, error = %e, "Could not read mixer");
        VolumeInfo::empty(device)
    })
}

fn with_volumes(catalog: &dyn DeviceCatalog, matched: Vec<Matched<AudioDevice>>) -> Vec<AudioMatch> {
    matched
        .into_iter()
        .map(|m| AudioMatch {
            volume: fetch_volume(catalog, &m.item),
            device: m.item,
            description: m.description,
        })
        .collect()
}

fn sibling_ports(catalog: &dyn DeviceCatalog, audio: &[Matched<AudioDevice>]) -> Vec<SerialPort> {
    let tree = catalog.tree();
    let mut seen = HashSet::new();
    let mut ports = Vec::new();

    for desc in audio.iter().filter_map(|m| m.description.as_ref()) {
        for sibling in topology::sibling_serial_ports(tree, desc) {
            if let Some(port) = topology::serial_port_for_description(catalog, &sibling) {
                if seen.insert(port.name.clone()) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

fn sibling_audio(catalog: &dyn DeviceCatalog, ports: &[PortMatch]) -> Vec<AudioDevice> {
    let tree = catalog.tree();
    let mut seen = HashSet::new();
    let mut devices = Vec::new();

    for desc in ports.iter().filter_map(|m| m.description.as_ref()) {
        for sibling in topology::sibling_audio_devices(tree, desc) {
            for device in topology::audio_devices_for_description(catalog, &sibling) {
                if seen.insert(device.hw_id.clone()) {
                    devices.push(device);
                }
            }
        }
    }
    devices
}

/// A listing that cannot be enumerated contributes no candidates
fn listed<T>(what: &str, listing: Result<Vec<T>>) -> Vec<T> {
    listing.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to enumerate {}", what);
        Vec::new()
    })
}

/// Search the catalog for matching audio devices and serial ports
#[instrument(skip(catalog, filters))]
pub fn search(
    catalog: &dyn DeviceCatalog,
    filters: &SearchFilters,
    mode: SearchMode,
) -> Result<SearchResult> {
    let tree = catalog.tree();

    let (audio, ports) = match mode {
        SearchMode::Independent => {
            let audio = filter::filter_audio(tree, &listed("audio devices", catalog.audio_devices()), &filters.audio);
            let ports = filter::filter_ports(tree, &listed("serial ports", catalog.serial_ports()), &filters.port);
            (audio, ports)
        }
        SearchMode::AudioSiblings => {
            let audio = filter::filter_audio(tree, &listed("audio devices", catalog.audio_devices()), &filters.audio);
            let candidates = sibling_ports(catalog, &audio);
            debug!(candidates = candidates.len(), "Collected sibling serial ports");
            let ports = filter::filter_ports(tree, &candidates, &filters.port);
            (audio, ports)
        }
        SearchMode::PortSiblings => {
            let ports = filter::filter_ports(tree, &listed("serial ports", catalog.serial_ports()), &filters.port);
            let candidates = sibling_audio(catalog, &ports);
            debug!(candidates = candidates.len(), "Collected sibling audio devices");
            let audio = filter::filter_audio(tree, &candidates, &filters.audio);
            (audio, ports)
        }
    };

    let result = SearchResult {
        audio_devices: with_volumes(catalog, audio),
        serial_ports: ports,
    };

    info!(
        %mode,
        audio_devices = result.audio_devices.len(),
        serial_ports = result.serial_ports.len(),
        "Search complete"
    );
    Ok(result)
}
