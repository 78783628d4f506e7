//! Configuration management for rigfinder
//!
//! This module provides:
//! - The TOML configuration file format (`rigfinder.toml`)
//! - Conversion of the file's sections into search filters and volume requests
//! - A config manager that locates the default config file

use crate::domain::audio::ParseError;
use crate::domain::filter::{AudioFilter, PortFilter, TopologyCriteria, TypeFilter};
use crate::domain::mixer::{ChannelId, ChannelType};
use crate::domain::search::{IncludedDevices, SearchFilters, SearchMode};
use crate::domain::volume::VolumeSetRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Topology filters shared by the audio and port sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl TopologyConfig {
    fn to_criteria(&self) -> TopologyCriteria {
        TopologyCriteria {
            bus_number: self.bus.unwrap_or(-1),
            device_number: self.device.unwrap_or(-1),
            topology_depth: self.topology.unwrap_or(-1),
            path: self.path.clone(),
        }
    }
}

/// `[search.audio]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSearchConfig {
    pub name: String,
    pub description: String,
    pub stream_name: String,
    /// `playback`, `capture`, `playback|capture`, `playback&capture` or `all`
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(flatten)]
    pub topology: TopologyConfig,
}

impl AudioSearchConfig {
    pub fn to_filter(&self) -> Result<AudioFilter> {
        Ok(AudioFilter {
            name: self.name.clone(),
            description: self.description.clone(),
            stream_name: self.stream_name.clone(),
            device_type: self.device_type.parse::<TypeFilter>()?,
            topology: self.topology.to_criteria(),
        })
    }
}

/// `[search.port]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSearchConfig {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
    pub serial_number: String,
    #[serde(flatten)]
    pub topology: TopologyConfig,
}

impl PortSearchConfig {
    pub fn to_filter(&self) -> PortFilter {
        PortFilter {
            name: self.name.clone(),
            description: self.description.clone(),
            manufacturer: self.manufacturer.clone(),
            device_serial_number: self.serial_number.clone(),
            topology: self.topology.to_criteria(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub audio: AudioSearchConfig,
    pub port: PortSearchConfig,
}

/// Per-channel values inside a `[[volume.controls]]` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelVolumeConfig {
    /// Comma-separated channel names, e.g. `"Front Left, Front Right"`
    pub channels: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_value: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_value: Option<u8>,
}

/// `[[volume.controls]]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlVolumeConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_value: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_value: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelVolumeConfig>,
}

/// `[volume]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_value: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_value: Option<u8>,
    /// Verification tolerance; 0 requires an exact match
    pub max_error_percent: u8,
    pub controls: Vec<ControlVolumeConfig>,
}

fn check_percent(what: &str, value: Option<u8>) -> Result<()> {
    match value {
        Some(v) if v > 100 => Err(ConfigError::Invalid(format!(
            "{} must be between 0 and 100, got {}",
            what, v
        ))),
        _ => Ok(()),
    }
}

impl VolumeConfig {
    /// Volume requests, global values first, then per control and per channel
    pub fn requests(&self) -> Result<Vec<VolumeSetRequest>> {
        let tolerance = self.max_error_percent;
        let mut requests = Vec::new();

        let mut push = |value: Option<u8>,
                        channel_type: ChannelType,
                        control: Option<&str>,
                        channels: &[ChannelId]| {
            if let Some(value) = value {
                let mut request = VolumeSetRequest::new(value)
                    .of_type(channel_type)
                    .on_channels(channels.to_vec())
                    .with_max_error(tolerance);
                if let Some(control) = control {
                    request = request.for_control(control);
                }
                requests.push(request);
            }
        };

        check_percent("volume.capture_value", self.capture_value)?;
        check_percent("volume.playback_value", self.playback_value)?;
        push(self.capture_value, ChannelType::Capture, None, &[]);
        push(self.playback_value, ChannelType::Playback, None, &[]);

        for control in &self.controls {
            if control.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "volume control entry without a name".to_string(),
                ));
            }
            check_percent(&control.name, control.capture_value)?;
            check_percent(&control.name, control.playback_value)?;
            push(control.capture_value, ChannelType::Capture, Some(control.name.as_str()), &[]);
            push(control.playback_value, ChannelType::Playback, Some(control.name.as_str()), &[]);

            for channel in &control.channels {
                let ids = ChannelId::parse_list(&channel.channels)?;
                check_percent(&channel.channels, channel.capture_value)?;
                check_percent(&channel.channels, channel.playback_value)?;
                push(channel.capture_value, ChannelType::Capture, Some(control.name.as_str()), ids.as_slice());
                push(channel.playback_value, ChannelType::Playback, Some(control.name.as_str()), ids.as_slice());
            }
        }

        Ok(requests)
    }
}

/// Complete rigfinder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigfinderConfig {
    pub search_mode: SearchMode,
    pub included_devices: IncludedDevices,
    /// Number of results a search must produce to succeed
    pub expected_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    pub search: SearchConfig,
    pub volume: VolumeConfig,
}

impl Default for RigfinderConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::default(),
            included_devices: IncludedDevices::default(),
            expected_count: 1,
            output_file: None,
            search: SearchConfig::default(),
            volume: VolumeConfig::default(),
        }
    }
}

impl RigfinderConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn to_filters(&self) -> Result<SearchFilters> {
        Ok(SearchFilters {
            audio: self.search.audio.to_filter()?,
            port: self.search.port.to_filter(),
        })
    }

    pub fn requests(&self) -> Result<Vec<VolumeSetRequest>> {
        self.volume.requests()
    }
}

/// Locates and loads the main config file
///
/// The default file is `~/.config/rigfinder/rigfinder.toml`.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("rigfinder.toml"),
        }
    }

    /// Get the default config directory path
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("rigfinder"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config file, or defaults when there is none.
    ///
    /// Unlike a missing file, a corrupt one is an error.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<RigfinderConfig> {
        if !fs::try_exists(&self.config_path).await? {
            info!(
                path = %self.config_path.display(),
                "Config file not found, using defaults"
            );
            return Ok(RigfinderConfig::default());
        }

        RigfinderConfig::load_from_file(&self.config_path).await
    }
}
