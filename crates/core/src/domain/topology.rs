//! USB topology resolution
//!
//! A sound card and a serial adapter inside the same USB dongle show up as
//! sibling interfaces under one hub or parent device. This module walks the
//! device tree to describe where a device sits (bus and device numbers,
//! hardware path, depth) and to find devices that share its parent.

use crate::domain::audio::{AudioDevice, DeviceCatalog, DeviceError, Result, SerialPort};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

const SOUND_SUBSYSTEM: &str = "sound";
const TTY_SUBSYSTEM: &str = "tty";

/// A node of the kernel device tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Absolute sysfs path, e.g. `/sys/devices/pci0000:00/.../2-1.2`
    pub syspath: String,
    /// Last component of the sysfs path, e.g. `card1`
    pub sysname: String,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub devtype: Option<String>,
    /// Device node under `/dev`, if any
    #[serde(default)]
    pub devnode: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DeviceNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.trim())
    }

    fn has_subsystem(&self) -> bool {
        self.subsystem.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// True for USB devices proper, as opposed to their interfaces
    pub fn is_usb_device(&self) -> bool {
        self.subsystem.as_deref() == Some("usb") && self.devtype.as_deref() == Some("usb_device")
    }
}

/// Read access to the device tree
pub trait DeviceTree {
    /// Look up a node by its sysfs path
    fn node(&self, syspath: &str) -> Option<DeviceNode>;

    /// The node's parent, or `None` at the root
    fn parent(&self, node: &DeviceNode) -> Option<DeviceNode>;

    /// All nodes belonging to a subsystem
    fn enumerate(&self, subsystem: &str) -> Vec<DeviceNode>;
}

/// Where a device sits in the USB topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub bus_number: i32,
    pub device_number: i32,
    /// sysfs path of the leaf node
    pub path: String,
    /// sysfs path of the nearest USB device ancestor
    pub hw_path: String,
    pub id_vendor: String,
    pub id_product: String,
    pub product: String,
    #[serde(rename = "device_manufacturer")]
    pub manufacturer: String,
    pub topology_depth: i32,
}

impl Default for DeviceDescription {
    fn default() -> Self {
        Self {
            bus_number: -1,
            device_number: -1,
            path: String::new(),
            hw_path: String::new(),
            id_vendor: String::new(),
            id_product: String::new(),
            product: String::new(),
            manufacturer: String::new(),
            topology_depth: -1,
        }
    }
}

/// Nearest ancestor (excluding `node` itself) that is a USB device
pub fn hardware_parent(tree: &dyn DeviceTree, node: &DeviceNode) -> Option<DeviceNode> {
    let mut current = tree.parent(node)?;
    loop {
        if current.is_usb_device() {
            return Some(current);
        }
        current = tree.parent(&current)?;
    }
}

/// Count the ancestors of `node` up to the first one without a subsystem
pub fn topology_depth(tree: &dyn DeviceTree, node: &DeviceNode) -> i32 {
    let mut depth = 0;
    let mut current = node.clone();
    while let Some(parent) = tree.parent(&current) {
        if !parent.has_subsystem() {
            break;
        }
        depth += 1;
        current = parent;
    }
    depth
}

/// Describe a leaf node through its nearest USB device ancestor
pub fn describe(tree: &dyn DeviceTree, node: &DeviceNode) -> Option<DeviceDescription> {
    let usb = hardware_parent(tree, node)?;

    let number = |name: &str| {
        usb.attribute(name)
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(-1)
    };
    let text = |name: &str| usb.attribute(name).unwrap_or_default().to_string();

    let description = DeviceDescription {
        bus_number: number("busnum"),
        device_number: number("devnum"),
        path: node.syspath.clone(),
        hw_path: usb.syspath.clone(),
        id_vendor: text("idVendor"),
        id_product: text("idProduct"),
        product: text("product"),
        manufacturer: text("manufacturer"),
        topology_depth: topology_depth(tree, &usb),
    };

    trace!(path = %description.path, hw_path = %description.hw_path, "Described node");
    Some(description)
}

fn card_node(tree: &dyn DeviceTree, card_id: u32) -> Option<DeviceNode> {
    let sysname = format!("card{}", card_id);
    tree.enumerate(SOUND_SUBSYSTEM)
        .into_iter()
        .find(|n| n.sysname == sysname)
}

fn tty_node(tree: &dyn DeviceTree, devnode: &str) -> Option<DeviceNode> {
    tree.enumerate(TTY_SUBSYSTEM)
        .into_iter()
        .find(|n| n.devnode.as_deref() == Some(devnode))
}

/// Describe the sound card that owns an audio device
pub fn resolve_audio_description(
    tree: &dyn DeviceTree,
    device: &AudioDevice,
) -> Result<DeviceDescription> {
    card_node(tree, device.card_id)
        .and_then(|node| describe(tree, &node))
        .ok_or_else(|| DeviceError::NotFound(format!("USB topology for {}", device.hw_id)))
}

/// Describe the USB device behind a serial port
pub fn resolve_port_description(
    tree: &dyn DeviceTree,
    port: &SerialPort,
) -> Result<DeviceDescription> {
    tty_node(tree, &port.name)
        .and_then(|node| describe(tree, &node))
        .ok_or_else(|| DeviceError::NotFound(format!("USB topology for {}", port.name)))
}

fn is_descendant(tree: &dyn DeviceTree, node: &DeviceNode, ancestor: &DeviceNode) -> bool {
    let mut current = node.clone();
    while let Some(parent) = tree.parent(&current) {
        if parent.syspath == ancestor.syspath {
            return true;
        }
        current = parent;
    }
    false
}

/// Descriptions of all `subsystem` nodes under the parent of `desc`'s USB device
fn sibling_devices(
    tree: &dyn DeviceTree,
    desc: &DeviceDescription,
    subsystem: &str,
    accept: impl Fn(&DeviceNode) -> bool,
) -> Vec<DeviceDescription> {
    let Some(leaf) = tree.node(&desc.path) else {
        return Vec::new();
    };
    let Some(usb) = hardware_parent(tree, &leaf) else {
        return Vec::new();
    };
    let Some(parent_usb) = hardware_parent(tree, &usb) else {
        return Vec::new();
    };

    let siblings: Vec<DeviceDescription> = tree
        .enumerate(subsystem)
        .into_iter()
        .filter(|n| accept(n))
        .filter(|n| is_descendant(tree, n, &parent_usb))
        .filter_map(|n| describe(tree, &n))
        .collect();

    debug!(
        anchor = %desc.path,
        parent = %parent_usb.syspath,
        subsystem,
        count = siblings.len(),
        "Found sibling devices"
    );
    siblings
}

/// Sound cards sharing a USB parent with `desc`
pub fn sibling_audio_devices(tree: &dyn DeviceTree, desc: &DeviceDescription) -> Vec<DeviceDescription> {
    sibling_devices(tree, desc, SOUND_SUBSYSTEM, |n| n.sysname.starts_with("card"))
}

/// Serial ports sharing a USB parent with `desc`
pub fn sibling_serial_ports(tree: &dyn DeviceTree, desc: &DeviceDescription) -> Vec<DeviceDescription> {
    sibling_devices(tree, desc, TTY_SUBSYSTEM, |_| true)
}

/// Audio devices of the sound card a description points at
pub fn audio_devices_for_description(
    catalog: &dyn DeviceCatalog,
    desc: &DeviceDescription,
) -> Vec<AudioDevice> {
    let card_id = catalog
        .tree()
        .node(&desc.path)
        .and_then(|node| node.attribute("number").and_then(|n| n.parse::<u32>().ok()));

    let Some(card_id) = card_id else {
        return Vec::new();
    };

    match catalog.audio_devices() {
        Ok(devices) => devices.into_iter().filter(|d| d.card_id == card_id).collect(),
        Err(e) => {
            debug!(error = %e, card_id, "Could not list audio devices for card");
            Vec::new()
        }
    }
}

/// Serial port whose device node a description points at
pub fn serial_port_for_description(
    catalog: &dyn DeviceCatalog,
    desc: &DeviceDescription,
) -> Option<SerialPort> {
    let devnode = catalog.tree().node(&desc.path)?.devnode?;
    catalog
        .serial_ports()
        .ok()?
        .into_iter()
        .find(|p| p.name == devnode)
}
