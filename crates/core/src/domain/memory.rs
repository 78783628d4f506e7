//! In-memory device catalog
//!
//! Simulates a host without touching hardware. Used by the test suites and
//! by the CLI's `--test-data` mode, which loads a [`HostFixture`] from TOML.

use crate::domain::audio::{
    AudioDevice, DeviceCatalog, DeviceError, DeviceType, Result, SerialPort,
};
use crate::domain::config::ConfigError;
use crate::domain::mixer::{ChannelId, ChannelType, MixerControl};
use crate::domain::topology::{DeviceNode, DeviceTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Device tree held in a map keyed by syspath
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    nodes: BTreeMap<String, DeviceNode>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: DeviceNode) -> &mut DeviceNode {
        let path = node.syspath.clone();
        self.nodes.insert(path.clone(), node);
        self.nodes.entry(path).or_default()
    }

    /// Add a node; its sysname is the last path component
    pub fn add(&mut self, syspath: &str, subsystem: Option<&str>, devtype: Option<&str>) -> &mut DeviceNode {
        self.insert(DeviceNode {
            syspath: syspath.to_string(),
            sysname: sysname_of(syspath).to_string(),
            subsystem: subsystem.map(str::to_string),
            devtype: devtype.map(str::to_string),
            ..Default::default()
        })
    }

    pub fn add_usb_device(&mut self, syspath: &str, bus: i32, device: i32) -> &mut DeviceNode {
        let node = self.add(syspath, Some("usb"), Some("usb_device"));
        node.attributes.insert("busnum".to_string(), bus.to_string());
        node.attributes.insert("devnum".to_string(), device.to_string());
        node
    }

    pub fn add_sound_card(&mut self, syspath: &str, number: u32) -> &mut DeviceNode {
        let node = self.add(syspath, Some("sound"), None);
        node.attributes.insert("number".to_string(), number.to_string());
        node
    }

    pub fn add_tty(&mut self, syspath: &str, devnode: &str) -> &mut DeviceNode {
        let node = self.add(syspath, Some("tty"), None);
        node.devnode = Some(devnode.to_string());
        node
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn sysname_of(syspath: &str) -> &str {
    syspath.rsplit('/').next().unwrap_or(syspath)
}

impl DeviceTree for MemoryTree {
    fn node(&self, syspath: &str) -> Option<DeviceNode> {
        self.nodes.get(syspath).cloned()
    }

    /// Nearest registered node whose path is a proper prefix of this one
    fn parent(&self, node: &DeviceNode) -> Option<DeviceNode> {
        let mut path = node.syspath.as_str();
        while let Some((head, _)) = path.rsplit_once('/') {
            if head.is_empty() {
                return None;
            }
            if let Some(parent) = self.nodes.get(head) {
                return Some(parent.clone());
            }
            path = head;
        }
        None
    }

    fn enumerate(&self, subsystem: &str) -> Vec<DeviceNode> {
        self.nodes
            .values()
            .filter(|n| n.subsystem.as_deref() == Some(subsystem))
            .cloned()
            .collect()
    }
}

/// Catalog backed by fixed device lists and mutable mixer state
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    audio: Vec<AudioDevice>,
    ports: Vec<SerialPort>,
    tree: MemoryTree,
    mixers: Mutex<HashMap<u32, Vec<MixerControl>>>,
    failing_controls: HashSet<(u32, String)>,
    audio_listing_error: Option<String>,
}

impl MemoryCatalog {
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            tree,
            ..Default::default()
        }
    }

    pub fn add_audio_device(&mut self, device: AudioDevice) {
        self.audio.push(device);
    }

    pub fn add_serial_port(&mut self, port: SerialPort) {
        self.ports.push(port);
    }

    /// Replace the mixer of a card
    pub fn set_mixer(&mut self, card_id: u32, controls: Vec<MixerControl>) {
        self.mixers
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(card_id, controls);
    }

    /// Make every write to `control` on `card_id` fail
    pub fn fail_writes(&mut self, card_id: u32, control: &str) {
        self.failing_controls.insert((card_id, control.to_string()));
    }

    /// Make audio device enumeration fail with `message`
    pub fn fail_audio_listing(&mut self, message: &str) {
        self.audio_listing_error = Some(message.to_string());
    }

    pub fn tree_mut(&mut self) -> &mut MemoryTree {
        &mut self.tree
    }
}

impl DeviceCatalog for MemoryCatalog {
    fn audio_devices(&self) -> Result<Vec<AudioDevice>> {
        if let Some(message) = &self.audio_listing_error {
            return Err(DeviceError::HardwareIo(message.clone()));
        }
        Ok(self.audio.clone())
    }

    fn serial_ports(&self) -> Result<Vec<SerialPort>> {
        Ok(self.ports.clone())
    }

    fn tree(&self) -> &dyn DeviceTree {
        &self.tree
    }

    fn mixer_controls(&self, device: &AudioDevice) -> Result<Vec<MixerControl>> {
        let mixers = self
            .mixers
            .lock()
            .map_err(|_| DeviceError::HardwareIo("mixer state lock poisoned".to_string()))?;

        mixers
            .get(&device.card_id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(format!("mixer for hw:{}", device.card_id)))
    }

    fn write_channel_raw(
        &self,
        device: &AudioDevice,
        control: &str,
        channel: ChannelId,
        channel_type: ChannelType,
        raw_value: i64,
    ) -> Result<()> {
        if self.failing_controls.contains(&(device.card_id, control.to_string())) {
            return Err(DeviceError::HardwareIo(format!(
                "write to '{}' on {} rejected",
                control, device.hw_id
            )));
        }

        let mut mixers = self
            .mixers
            .lock()
            .map_err(|_| DeviceError::HardwareIo("mixer state lock poisoned".to_string()))?;

        let state = mixers
            .get_mut(&device.card_id)
            .and_then(|controls| controls.iter_mut().find(|c| c.name == control))
            .and_then(|c| {
                c.channels
                    .iter_mut()
                    .find(|s| s.id == channel && s.channel_type == channel_type)
            })
            .ok_or_else(|| {
                DeviceError::NotFound(format!(
                    "{} channel {} of '{}' on {}",
                    channel_type, channel, control, device.hw_id
                ))
            })?;

        // Hardware clamps out of range writes
        let value = raw_value.clamp(state.range.min, state.range.max);
        state.value = value;

        // dB follows the raw value linearly
        if let Some(db) = state.db_range {
            let span = state.range.max - state.range.min;
            if span != 0 {
                let db_value = db.min + (value - state.range.min) * (db.max - db.min) / span;
                state.db_value = Some(db_value);
            }
        }

        debug!(device = %device.hw_id, control, channel = %channel, value, "Wrote raw volume");
        Ok(())
    }
}

/// Simulated host description, loadable from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostFixture {
    #[serde(default)]
    pub audio: Vec<AudioDeviceFixture>,
    #[serde(default)]
    pub ports: Vec<SerialPort>,
    #[serde(default)]
    pub nodes: Vec<NodeFixture>,
    #[serde(default)]
    pub mixers: Vec<MixerFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceFixture {
    pub card_id: u32,
    pub device_id: u32,
    pub name: String,
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFixture {
    pub syspath: String,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub devtype: Option<String>,
    #[serde(default)]
    pub devnode: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerFixture {
    pub card_id: u32,
    #[serde(default)]
    pub controls: Vec<MixerControl>,
}

impl HostFixture {
    pub fn from_toml(contents: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    #[instrument]
    pub async fn load_from_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading test data");
        let contents = fs::read_to_string(path).await?;
        Self::from_toml(&contents)
    }

    pub fn into_catalog(self) -> MemoryCatalog {
        let mut tree = MemoryTree::new();
        for node in self.nodes {
            tree.insert(DeviceNode {
                sysname: sysname_of(&node.syspath).to_string(),
                syspath: node.syspath,
                subsystem: node.subsystem,
                devtype: node.devtype,
                devnode: node.devnode,
                attributes: node.attributes,
            });
        }

        let mut catalog = MemoryCatalog::new(tree);
        for device in self.audio {
            catalog.add_audio_device(AudioDevice::new(
                device.card_id,
                device.device_id,
                device.name,
                device.stream_name,
                device.description,
                device.device_type,
            ));
        }
        for port in self.ports {
            catalog.add_serial_port(port);
        }
        for mixer in self.mixers {
            catalog.set_mixer(mixer.card_id, mixer.controls);
        }
        catalog
    }
}
