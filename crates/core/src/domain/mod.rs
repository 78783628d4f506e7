//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod curve;
pub mod filter;
pub mod memory;
pub mod mixer;
pub mod search;
pub mod topology;
pub mod volume;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioDevice, DeviceCatalog, DeviceError, DeviceType, ParseError, SerialPort};
pub use config::{ConfigError, ConfigManager, RigfinderConfig};
pub use filter::{AudioFilter, Matched, PortFilter, TopologyCriteria, TypeFilter};
pub use memory::{HostFixture, MemoryCatalog, MemoryTree};
pub use mixer::{volume_info, Channel, ChannelId, ChannelType, Control, MixerControl, VolumeInfo};
pub use search::{search, IncludedDevices, SearchFilters, SearchMode, SearchResult};
pub use topology::{DeviceDescription, DeviceNode, DeviceTree};
pub use volume::{
    apply, probe, resolve_volume_plan, verify, ApplyReport, ProbeResult, VerifyReport,
    VolumePlan, VolumeSetRequest,
};
