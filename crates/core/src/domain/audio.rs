//! Device abstractions and domain models
//!
//! This module defines the platform-agnostic view of the hardware that
//! rigfinder searches: ALSA-style PCM devices, USB serial ports, and the
//! [`DeviceCatalog`] trait that platform layers implement. Implementations
//! for a real Linux host live in the `infra` crate; an in-memory catalog for
//! tests and fixtures lives in [`crate::domain::memory`].

use crate::domain::mixer::{ChannelId, ChannelType, MixerControl};
use crate::domain::topology::DeviceTree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while talking to devices
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No matching device, port or ancestor exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying device call failed
    #[error("Hardware I/O error: {0}")]
    HardwareIo(String),

    /// A volume range whose minimum equals its maximum
    #[error("Invalid volume range: min {min} equals max {max}")]
    InvalidRange { min: i64, max: i64 },

    /// Post-apply verification found settings outside their tolerance
    #[error("Tolerance exceeded on {count} volume setting(s)")]
    ToleranceExceeded { count: usize },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Error returned when parsing user-facing identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Stream directions supported by a PCM device, as a bit-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceType(u8);

impl DeviceType {
    pub const UNKNOWN: Self = Self(0);
    pub const PLAYBACK: Self = Self(1);
    pub const CAPTURE: Self = Self(2);
    pub const DUPLEX: Self = Self(1 | 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `flag` is present. `UNKNOWN` is never contained.
    pub fn contains(self, flag: Self) -> bool {
        flag.0 != 0 && self.0 & flag.0 == flag.0
    }

    pub fn is_playback(self) -> bool {
        self.contains(Self::PLAYBACK)
    }

    pub fn is_capture(self) -> bool {
        self.contains(Self::CAPTURE)
    }
}

impl BitOr for DeviceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DeviceType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DeviceType {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match (self.is_playback(), self.is_capture()) {
            (true, true) => "capture&playback",
            (true, false) => "playback",
            (false, true) => "capture",
            (false, false) => "unknown",
        };
        f.write_str(label)
    }
}

impl FromStr for DeviceType {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut device_type = DeviceType::UNKNOWN;
        for part in s.split(['&', '|']) {
            match part.trim().to_ascii_lowercase().as_str() {
                "playback" => device_type |= DeviceType::PLAYBACK,
                "capture" => device_type |= DeviceType::CAPTURE,
                "unknown" | "uknown" => {}
                _ => return Err(ParseError::new("device type", s)),
            }
        }
        Ok(device_type)
    }
}

impl TryFrom<String> for DeviceType {
    type Error = ParseError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.to_string()
    }
}

/// A PCM device on a sound card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub card_id: u32,
    pub device_id: u32,
    pub hw_id: String,
    pub plughw_id: String,
    pub name: String,
    pub stream_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

impl AudioDevice {
    pub fn new(
        card_id: u32,
        device_id: u32,
        name: impl Into<String>,
        stream_name: impl Into<String>,
        description: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            card_id,
            device_id,
            hw_id: format!("hw:{},{}", card_id, device_id),
            plughw_id: format!("plughw:{},{}", card_id, device_id),
            name: name.into(),
            stream_name: stream_name.into(),
            description: description.into(),
            device_type,
        }
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "card id: '{}', device id: '{}', name: '{}', desc: '{}', type: '{}'",
            self.card_id, self.device_id, self.name, self.description, self.device_type
        )
    }
}

/// A serial port backed by a USB device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerialPort {
    /// Device node, e.g. `/dev/ttyUSB0`
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub device_serial_number: String,
}

/// Platform access to devices, their topology and their mixers
///
/// Every call acquires whatever native handles it needs and releases them
/// before returning; implementations hold no open handles between calls.
pub trait DeviceCatalog {
    /// List all PCM devices. A card that fails to open is skipped.
    fn audio_devices(&self) -> Result<Vec<AudioDevice>>;

    /// List all USB serial ports
    fn serial_ports(&self) -> Result<Vec<SerialPort>>;

    /// Device tree used for topology resolution
    fn tree(&self) -> &dyn DeviceTree;

    /// Raw mixer state of the card that owns `device`
    fn mixer_controls(&self, device: &AudioDevice) -> Result<Vec<MixerControl>>;

    /// Write a raw value to one channel of a mixer control
    fn write_channel_raw(
        &self,
        device: &AudioDevice,
        control: &str,
        channel: ChannelId,
        channel_type: ChannelType,
        raw_value: i64,
    ) -> Result<()>;
}
