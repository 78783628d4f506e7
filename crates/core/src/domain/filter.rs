//! Device matching and deduplication

use crate::domain::audio::{AudioDevice, DeviceType, ParseError, SerialPort};
use crate::domain::topology::{self, DeviceDescription, DeviceTree};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, trace};

/// Constraint on the stream directions of an audio device
///
/// The flags are checked in precedence order: `playback_and_capture`, then
/// `playback_or_capture`, then the two exclusive flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeFilter {
    pub playback_only: bool,
    pub capture_only: bool,
    pub playback_or_capture: bool,
    pub playback_and_capture: bool,
}

impl TypeFilter {
    pub fn matches(&self, device_type: DeviceType) -> bool {
        let playback = device_type.is_playback();
        let capture = device_type.is_capture();

        if self.playback_and_capture {
            return playback && capture;
        }
        if self.playback_or_capture {
            return playback || capture;
        }

        let mut matched = true;
        if self.playback_only {
            matched &= playback && !capture;
        }
        if self.capture_only {
            matched &= capture && !playback;
        }
        matched
    }
}

impl FromStr for TypeFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        let mut filter = TypeFilter::default();
        match normalized.as_str() {
            "" | "all" => {}
            "playback" => filter.playback_only = true,
            "capture" => filter.capture_only = true,
            "playback|capture" | "capture|playback" => filter.playback_or_capture = true,
            "playback&capture" | "capture&playback" => filter.playback_and_capture = true,
            _ => return Err(ParseError::new("audio type", s)),
        }
        Ok(filter)
    }
}

/// Filters on a device's position in the USB topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyCriteria {
    /// -1 when unset
    pub bus_number: i32,
    /// -1 when unset
    pub device_number: i32,
    /// -1 when unset
    pub topology_depth: i32,
    /// Prefix of the hardware path, empty when unset
    pub path: String,
}

impl Default for TopologyCriteria {
    fn default() -> Self {
        Self {
            bus_number: -1,
            device_number: -1,
            topology_depth: -1,
            path: String::new(),
        }
    }
}

impl TopologyCriteria {
    pub fn is_set(&self) -> bool {
        self.bus_number != -1
            || self.device_number != -1
            || self.topology_depth != -1
            || !self.path.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFilter {
    pub name: String,
    pub description: String,
    pub stream_name: String,
    pub device_type: TypeFilter,
    pub topology: TopologyCriteria,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
    pub device_serial_number: String,
    pub topology: TopologyCriteria,
}

/// A device that passed a filter, with its resolved topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matched<T> {
    #[serde(flatten)]
    pub item: T,
    /// Serialized inline next to the item's own fields
    #[serde(flatten)]
    pub description: Option<DeviceDescription>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn match_audio_device(device: &AudioDevice, filter: &AudioFilter) -> bool {
    contains_ignore_case(&device.name, &filter.name)
        && contains_ignore_case(&device.description, &filter.description)
        && contains_ignore_case(&device.stream_name, &filter.stream_name)
        && filter.device_type.matches(device.device_type)
}

pub fn match_serial_port(port: &SerialPort, filter: &PortFilter) -> bool {
    contains_ignore_case(&port.name, &filter.name)
        && contains_ignore_case(&port.description, &filter.description)
        && contains_ignore_case(&port.manufacturer, &filter.manufacturer)
        && contains_ignore_case(&port.device_serial_number, &filter.device_serial_number)
}

pub fn match_description(desc: &DeviceDescription, criteria: &TopologyCriteria) -> bool {
    (criteria.bus_number == -1 || criteria.bus_number == desc.bus_number)
        && (criteria.device_number == -1 || criteria.device_number == desc.device_number)
        && (criteria.topology_depth == -1 || criteria.topology_depth == desc.topology_depth)
        && (criteria.path.is_empty() || desc.hw_path.starts_with(&criteria.path))
}

/// Apply the topology part of a filter to an optional description
fn keep_description(desc: Option<&DeviceDescription>, criteria: &TopologyCriteria) -> bool {
    match desc {
        Some(desc) => match_description(desc, criteria),
        None => !criteria.is_set(),
    }
}

/// Filter audio devices, deduplicating by `hw_id` (first occurrence wins)
pub fn filter_audio(
    tree: &dyn DeviceTree,
    devices: &[AudioDevice],
    filter: &AudioFilter,
) -> Vec<Matched<AudioDevice>> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for device in devices {
        if !match_audio_device(device, filter) {
            trace!(device = %device.hw_id, "Audio device rejected by filter");
            continue;
        }

        let description = topology::resolve_audio_description(tree, device).ok();
        if !keep_description(description.as_ref(), &filter.topology) {
            trace!(device = %device.hw_id, "Audio device rejected by topology filter");
            continue;
        }

        if seen.insert(device.hw_id.clone()) {
            matched.push(Matched {
                item: device.clone(),
                description,
            });
        }
    }

    debug!(total = devices.len(), matched = matched.len(), "Filtered audio devices");
    matched
}

/// Filter serial ports, deduplicating by name (first occurrence wins)
pub fn filter_ports(
    tree: &dyn DeviceTree,
    ports: &[SerialPort],
    filter: &PortFilter,
) -> Vec<Matched<SerialPort>> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for port in ports {
        if !match_serial_port(port, filter) {
            trace!(port = %port.name, "Serial port rejected by filter");
            continue;
        }

        let description = topology::resolve_port_description(tree, port).ok();
        if !keep_description(description.as_ref(), &filter.topology) {
            trace!(port = %port.name, "Serial port rejected by topology filter");
            continue;
        }

        if seen.insert(port.name.clone()) {
            matched.push(Matched {
                item: port.clone(),
                description,
            });
        }
    }

    debug!(total = ports.len(), matched = matched.len(), "Filtered serial ports");
    matched
}
