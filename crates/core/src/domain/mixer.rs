//! Mixer controls, channels and volume snapshots
//!
//! The catalog reports mixer state in raw hardware units ([`MixerControl`]);
//! [`VolumeInfo::fetch`] turns that into normalized percentages through the
//! curve translator.

use crate::domain::audio::{AudioDevice, DeviceCatalog, ParseError, Result};
use crate::domain::curve::{self, DbReading, RawReading};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Position of a channel within a mixer control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    RearCenter,
    Woofer,
    SideLeft,
    SideRight,
    Mono,
    None,
}

impl ChannelId {
    const ALL: [ChannelId; 11] = [
        ChannelId::FrontLeft,
        ChannelId::FrontRight,
        ChannelId::FrontCenter,
        ChannelId::RearLeft,
        ChannelId::RearRight,
        ChannelId::RearCenter,
        ChannelId::Woofer,
        ChannelId::SideLeft,
        ChannelId::SideRight,
        ChannelId::Mono,
        ChannelId::None,
    ];

    /// Map an ALSA simple-element channel position
    pub fn from_position(position: i32) -> Self {
        match position {
            0 => ChannelId::FrontLeft,
            1 => ChannelId::FrontRight,
            2 => ChannelId::RearLeft,
            3 => ChannelId::RearRight,
            4 => ChannelId::FrontCenter,
            5 => ChannelId::Woofer,
            6 => ChannelId::SideLeft,
            7 => ChannelId::SideRight,
            8 => ChannelId::RearCenter,
            _ => ChannelId::None,
        }
    }

    /// ALSA simple-element channel position. Mono shares position 0 with front left.
    pub fn position(self) -> i32 {
        match self {
            ChannelId::FrontLeft => 0,
            ChannelId::FrontRight => 1,
            ChannelId::RearLeft => 2,
            ChannelId::RearRight => 3,
            ChannelId::FrontCenter => 4,
            ChannelId::Woofer => 5,
            ChannelId::SideLeft => 6,
            ChannelId::SideRight => 7,
            ChannelId::RearCenter => 8,
            ChannelId::Mono | ChannelId::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::FrontLeft => "front_left",
            ChannelId::FrontRight => "front_right",
            ChannelId::FrontCenter => "front_center",
            ChannelId::RearLeft => "rear_left",
            ChannelId::RearRight => "rear_right",
            ChannelId::RearCenter => "rear_center",
            ChannelId::Woofer => "woofer",
            ChannelId::SideLeft => "side_left",
            ChannelId::SideRight => "side_right",
            ChannelId::Mono => "mono",
            ChannelId::None => "none",
        }
    }

    /// Name as ALSA prints it, e.g. "Front Left"
    pub fn display_name(self) -> &'static str {
        match self {
            ChannelId::FrontLeft => "Front Left",
            ChannelId::FrontRight => "Front Right",
            ChannelId::FrontCenter => "Front Center",
            ChannelId::RearLeft => "Rear Left",
            ChannelId::RearRight => "Rear Right",
            ChannelId::RearCenter => "Rear Center",
            ChannelId::Woofer => "Woofer",
            ChannelId::SideLeft => "Side Left",
            ChannelId::SideRight => "Side Right",
            ChannelId::Mono => "Mono",
            ChannelId::None => "None",
        }
    }

    /// Parse a comma-separated list such as `"Front Left, Front Center"`
    pub fn parse_list(list: &str) -> std::result::Result<Vec<Self>, ParseError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = ParseError;

    /// Accepts both `front_left` and `Front Left`, case-insensitively
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        ChannelId::ALL
            .into_iter()
            .find(|id| {
                id.as_str().eq_ignore_ascii_case(wanted)
                    || id.display_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ParseError::new("channel", s))
    }
}

/// Direction of a mixer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Playback,
    Capture,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Playback => f.write_str("playback"),
            ChannelType::Capture => f.write_str("capture"),
        }
    }
}

impl FromStr for ChannelType {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playback" => Ok(ChannelType::Playback),
            "capture" => Ok(ChannelType::Capture),
            _ => Err(ParseError::new("channel type", s)),
        }
    }
}

/// Raw hardware volume range of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRange {
    pub min: i64,
    pub max: i64,
}

/// Decibel range of a channel, in hundredths of a dB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbRange {
    pub min: i64,
    pub max: i64,
}

/// Raw state of one channel as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerChannelState {
    pub id: ChannelId,
    pub channel_type: ChannelType,
    pub range: RawRange,
    pub value: i64,
    #[serde(default)]
    pub db_range: Option<DbRange>,
    #[serde(default)]
    pub db_value: Option<i64>,
}

/// Raw state of a named mixer control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerControl {
    pub name: String,
    pub channels: Vec<MixerChannelState>,
}

/// A channel of a volume control, normalized to percentages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    /// Curve-aware percentage (decibel mapping when available)
    pub volume_percent: u8,
    /// Linear percentage of the raw range; inverse of the set direction.
    /// `None` when the raw range is degenerate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_percent: Option<u8>,
    pub range: RawRange,
    pub raw_value: i64,
}

impl Channel {
    /// Normalize a raw channel state.
    ///
    /// Fails with `InvalidRange` only when neither the decibel range nor the
    /// raw range is usable.
    pub fn from_state(state: &MixerChannelState) -> Result<Self> {
        let raw = RawReading {
            min: state.range.min,
            max: state.range.max,
            value: state.value,
        };
        let db = match (state.db_range, state.db_value) {
            (Some(range), Some(value)) => Some(DbReading {
                min: range.min,
                max: range.max,
                value,
            }),
            _ => None,
        };

        let volume_percent = curve::to_percent(raw, db)?;
        let raw_percent = curve::to_percent(raw, None).ok();

        Ok(Self {
            id: state.id,
            channel_type: state.channel_type,
            name: state.id.display_name().to_string(),
            volume_percent,
            raw_percent,
            range: state.range,
            raw_value: state.value,
        })
    }

    /// Percentage used to read back a written volume. Channels that only
    /// carry a usable dB range read back through their curve.
    pub fn readback_percent(&self) -> u8 {
        self.raw_percent.unwrap_or(self.volume_percent)
    }
}

/// A named volume control and its channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub name: String,
    pub channels: Vec<Channel>,
}

impl Control {
    pub fn channel(&self, id: ChannelId, channel_type: ChannelType) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.id == id && c.channel_type == channel_type)
    }
}

/// Full mixer snapshot of one audio device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub audio_device: AudioDevice,
    pub controls: Vec<Control>,
}

impl VolumeInfo {
    /// Fetch a fresh snapshot of the device's mixer
    pub fn fetch(catalog: &dyn DeviceCatalog, device: &AudioDevice) -> Result<Self> {
        let raw_controls = catalog.mixer_controls(device)?;

        let controls = raw_controls
            .iter()
            .map(|control| Control {
                name: control.name.clone(),
                channels: control
                    .channels
                    .iter()
                    .filter_map(|state| match Channel::from_state(state) {
                        Ok(channel) => Some(channel),
                        Err(e) => {
                            warn!(
                                device = %device.hw_id,
                                control = %control.name,
                                channel = %state.id,
                                error = %e,
                                "Skipping channel without a usable range"
                            );
                            None
                        }
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!(device = %device.hw_id, controls = controls.len(), "Fetched volume info");

        Ok(Self {
            audio_device: device.clone(),
            controls,
        })
    }

    /// Snapshot with no controls, used when the mixer cannot be read
    pub fn empty(device: &AudioDevice) -> Self {
        Self {
            audio_device: device.clone(),
            controls: Vec::new(),
        }
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.name == name)
    }

    pub fn channel(&self, control: &str, id: ChannelId, channel_type: ChannelType) -> Option<&Channel> {
        self.control(control)
            .and_then(|c| c.channel(id, channel_type))
    }
}

/// Fresh mixer snapshot of `device`
pub fn volume_info(catalog: &dyn DeviceCatalog, device: &AudioDevice) -> Result<VolumeInfo> {
    VolumeInfo::fetch(catalog, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(min: i64, max: i64, value: i64) -> MixerChannelState {
        MixerChannelState {
            id: ChannelId::FrontLeft,
            channel_type: ChannelType::Playback,
            range: RawRange { min, max },
            value,
            db_range: None,
            db_value: None,
        }
    }

    #[test]
    fn test_channel_id_parsing() {
        assert_eq!("front_left".parse::<ChannelId>().unwrap(), ChannelId::FrontLeft);
        assert_eq!("Front Left".parse::<ChannelId>().unwrap(), ChannelId::FrontLeft);
        assert_eq!("side right".parse::<ChannelId>().unwrap(), ChannelId::SideRight);
        assert_eq!("MONO".parse::<ChannelId>().unwrap(), ChannelId::Mono);
        assert!("left".parse::<ChannelId>().is_err());
    }

    #[test]
    fn test_channel_id_list() {
        let ids = ChannelId::parse_list("Front Left, Front Center").unwrap();
        assert_eq!(ids, vec![ChannelId::FrontLeft, ChannelId::FrontCenter]);
        assert!(ChannelId::parse_list("Front Left, Back").is_err());
        assert!(ChannelId::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_channel_position_round_trip() {
        for position in 0..=8 {
            assert_eq!(ChannelId::from_position(position).position(), position);
        }
        assert_eq!(ChannelId::from_position(31), ChannelId::None);
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("Capture".parse::<ChannelType>().unwrap(), ChannelType::Capture);
        assert!("all".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_channel_from_raw_state() {
        let channel = Channel::from_state(&state(0, 31, 31)).unwrap();
        assert_eq!(channel.volume_percent, 100);
        assert_eq!(channel.raw_percent, Some(100));
        assert_eq!(channel.name, "Front Left");
    }

    #[test]
    fn test_channel_with_db_range_keeps_both_percentages() {
        let mut s = state(0, 100, 50);
        s.db_range = Some(DbRange { min: -6000, max: 0 });
        s.db_value = Some(-600);

        let channel = Channel::from_state(&s).unwrap();
        assert_eq!(channel.raw_percent, Some(50));
        assert_eq!(channel.readback_percent(), 50);
        // Wide dB range uses the logarithmic curve
        assert_eq!(channel.volume_percent, 77);
    }

    #[test]
    fn test_degenerate_channel_is_rejected() {
        assert!(Channel::from_state(&state(5, 5, 5)).is_err());
    }

    #[test]
    fn test_db_only_channel_has_no_raw_percentage() {
        let mut s = state(5, 5, 5);
        s.db_range = Some(DbRange { min: -1200, max: 0 });
        s.db_value = Some(0);

        let channel = Channel::from_state(&s).unwrap();
        assert_eq!(channel.volume_percent, 100);
        assert_eq!(channel.raw_percent, None);
        assert_eq!(channel.readback_percent(), 100);

        let json = serde_json::to_value(&channel).unwrap();
        assert!(json.get("raw_percent").is_none());
    }
}
