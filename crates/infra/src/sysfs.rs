//! sysfs-backed device tree and fallback catalog
//!
//! The kernel exposes the device hierarchy under `/sys/devices`, with
//! per-subsystem views under `/sys/class/<subsystem>` as symlinks into it.
//! A directory holding a `uevent` file is a device; its parent device is the
//! nearest ancestor directory that also holds one.

use rigfinder_core::domain::audio::{
    AudioDevice, DeviceCatalog, DeviceError, DeviceType, Result, SerialPort,
};
use rigfinder_core::domain::mixer::{ChannelId, ChannelType, MixerControl};
use rigfinder_core::domain::topology::{self, DeviceNode, DeviceTree};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Attributes read for every node
const ATTRIBUTES: &[&str] = &[
    "busnum",
    "devnum",
    "idVendor",
    "idProduct",
    "product",
    "manufacturer",
    "serial",
    "number",
    "id",
    "interface",
];

#[derive(Debug, Clone)]
pub struct SysfsTree {
    root: PathBuf,
}

impl Default for SysfsTree {
    fn default() -> Self {
        Self::with_root("/sys")
    }
}

impl SysfsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree rooted somewhere other than `/sys`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_node(&self, path: &Path) -> Option<DeviceNode> {
        if !path.join("uevent").is_file() {
            return None;
        }

        let mut node = DeviceNode {
            syspath: path.to_string_lossy().into_owned(),
            sysname: path.file_name()?.to_string_lossy().into_owned(),
            ..Default::default()
        };

        if let Ok(uevent) = fs::read_to_string(path.join("uevent")) {
            for (key, value) in uevent.lines().filter_map(|l| l.split_once('=')) {
                match key {
                    "DEVTYPE" => node.devtype = Some(value.to_string()),
                    "DEVNAME" => node.devnode = Some(format!("/dev/{}", value)),
                    _ => {}
                }
            }
        }

        node.subsystem = fs::read_link(path.join("subsystem"))
            .ok()
            .and_then(|link| link.file_name().map(|n| n.to_string_lossy().into_owned()));

        let attributes: BTreeMap<String, String> = ATTRIBUTES
            .iter()
            .filter_map(|name| {
                fs::read_to_string(path.join(name))
                    .ok()
                    .map(|v| (name.to_string(), v.trim().to_string()))
            })
            .collect();
        node.attributes = attributes;

        Some(node)
    }
}

impl DeviceTree for SysfsTree {
    fn node(&self, syspath: &str) -> Option<DeviceNode> {
        self.read_node(Path::new(syspath))
    }

    fn parent(&self, node: &DeviceNode) -> Option<DeviceNode> {
        let mut path = Path::new(&node.syspath).parent();
        while let Some(dir) = path {
            if dir == self.root || !dir.starts_with(&self.root) {
                return None;
            }
            if let Some(parent) = self.read_node(dir) {
                return Some(parent);
            }
            path = dir.parent();
        }
        None
    }

    fn enumerate(&self, subsystem: &str) -> Vec<DeviceNode> {
        let class_dir = self.root.join("class").join(subsystem);
        let entries = match fs::read_dir(&class_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %class_dir.display(), error = %e, "Cannot list device class");
                return Vec::new();
            }
        };

        let mut nodes: Vec<DeviceNode> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| match fs::canonicalize(entry.path()) {
                Ok(path) => self.read_node(&path),
                Err(e) => {
                    trace!(path = %entry.path().display(), error = %e, "Dangling class link");
                    None
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.syspath.cmp(&b.syspath));
        nodes
    }
}

/// Serial ports backed by a USB device, described from that device
pub fn usb_serial_ports(tree: &dyn DeviceTree) -> Vec<SerialPort> {
    tree.enumerate("tty")
        .into_iter()
        .filter_map(|node| {
            let usb = topology::hardware_parent(tree, &node)?;
            let devnode = node.devnode?;
            let attribute = |name: &str| usb.attribute(name).unwrap_or_default().to_string();
            Some(SerialPort {
                name: devnode,
                description: attribute("product"),
                manufacturer: attribute("manufacturer"),
                device_serial_number: attribute("serial"),
            })
        })
        .collect()
}

/// Card names parsed from `/proc/asound/cards`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardNames {
    pub name: String,
    pub long_name: String,
}

/// Parse `/proc/asound/cards`.
///
/// Each card takes two lines:
/// ```text
///  1 [Device         ]: USB-Audio - USB Audio Device
///                       C-Media Electronics Inc. USB Audio Device at usb-0000:00:14.0-1
/// ```
pub fn parse_cards(contents: &str) -> HashMap<u32, CardNames> {
    let mut cards = HashMap::new();
    let mut lines = contents.lines();

    while let Some(line) = lines.next() {
        let Some((index, rest)) = line.trim_start().split_once(' ') else {
            continue;
        };
        let Ok(index) = index.parse::<u32>() else {
            continue;
        };
        let name = rest
            .split_once(" - ")
            .map(|(_, short)| short.trim().to_string())
            .unwrap_or_default();
        let long_name = lines.next().map(|l| l.trim().to_string()).unwrap_or_default();
        cards.insert(index, CardNames { name, long_name });
    }
    cards
}

/// The `name:` line of a `/proc/asound/cardN/pcmDx/info` file
fn parse_pcm_name(info: &str) -> Option<String> {
    info.lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(key, _)| key.trim() == "name")
        .map(|(_, value)| value.trim().to_string())
}

/// Catalog that needs nothing but sysfs and procfs
///
/// It lists devices and ports but cannot reach mixers.
#[derive(Debug, Clone)]
pub struct SysfsCatalog {
    tree: SysfsTree,
    asound: PathBuf,
}

impl Default for SysfsCatalog {
    fn default() -> Self {
        Self::with_roots("/sys", "/proc/asound")
    }
}

impl SysfsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots(sys: impl Into<PathBuf>, asound: impl Into<PathBuf>) -> Self {
        Self {
            tree: SysfsTree::with_root(sys),
            asound: asound.into(),
        }
    }

    pub fn sysfs_tree(&self) -> &SysfsTree {
        &self.tree
    }

    fn pcm_devices(&self, card_id: u32, names: &CardNames) -> Vec<AudioDevice> {
        let card_dir = self.asound.join(format!("card{}", card_id));
        let entries = match fs::read_dir(&card_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(card = card_id, error = %e, "Skipping unreadable card");
                return Vec::new();
            }
        };

        // pcm0p, pcm0c, pcm3p ... grouped by device number
        let mut devices: BTreeMap<u32, (DeviceType, String)> = BTreeMap::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = file_name.strip_prefix("pcm") else {
                continue;
            };
            let (number, direction) = rest.split_at(rest.len().saturating_sub(1));
            let Ok(device_id) = number.parse::<u32>() else {
                continue;
            };
            let flag = match direction {
                "p" => DeviceType::PLAYBACK,
                "c" => DeviceType::CAPTURE,
                _ => continue,
            };

            let stream_name = fs::read_to_string(entry.path().join("info"))
                .ok()
                .and_then(|info| parse_pcm_name(&info))
                .unwrap_or_default();

            let slot = devices.entry(device_id).or_insert((DeviceType::UNKNOWN, String::new()));
            slot.0 |= flag;
            if slot.1.is_empty() {
                slot.1 = stream_name;
            }
        }

        devices
            .into_iter()
            .map(|(device_id, (device_type, stream_name))| {
                AudioDevice::new(
                    card_id,
                    device_id,
                    names.name.clone(),
                    stream_name,
                    names.long_name.clone(),
                    device_type,
                )
            })
            .collect()
    }
}

impl DeviceCatalog for SysfsCatalog {
    fn audio_devices(&self) -> Result<Vec<AudioDevice>> {
        let cards_file = self.asound.join("cards");
        let contents = fs::read_to_string(&cards_file).map_err(|e| {
            DeviceError::HardwareIo(format!("{}: {}", cards_file.display(), e))
        })?;

        let mut cards: Vec<(u32, CardNames)> = parse_cards(&contents).into_iter().collect();
        cards.sort_by_key(|(index, _)| *index);

        let devices: Vec<AudioDevice> = cards
            .iter()
            .flat_map(|(card_id, names)| self.pcm_devices(*card_id, names))
            .collect();
        debug!(count = devices.len(), "Enumerated audio devices from procfs");
        Ok(devices)
    }

    fn serial_ports(&self) -> Result<Vec<SerialPort>> {
        Ok(usb_serial_ports(&self.tree))
    }

    fn tree(&self) -> &dyn DeviceTree {
        &self.tree
    }

    fn mixer_controls(&self, device: &AudioDevice) -> Result<Vec<MixerControl>> {
        Err(DeviceError::HardwareIo(format!(
            "mixer of {} unavailable without ALSA support",
            device.hw_id
        )))
    }

    fn write_channel_raw(
        &self,
        device: &AudioDevice,
        _control: &str,
        _channel: ChannelId,
        _channel_type: ChannelType,
        _raw_value: i64,
    ) -> Result<()> {
        Err(DeviceError::HardwareIo(format!(
            "mixer of {} unavailable without ALSA support",
            device.hw_id
        )))
    }
}
