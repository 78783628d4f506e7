//! Linux platform layer for rigfinder
//!
//! Provides the sysfs device tree and the device catalogs:
//! - [`AlsaCatalog`]: cards, PCM devices and mixers through ALSA
//! - [`SysfsCatalog`]: procfs/sysfs only, without mixer access

#[cfg(all(target_os = "linux", feature = "alsa"))]
pub mod alsa_backend;
pub mod sysfs;

#[cfg(all(target_os = "linux", feature = "alsa"))]
pub use alsa_backend::AlsaCatalog;
pub use sysfs::{SysfsCatalog, SysfsTree};

use rigfinder_core::domain::audio::DeviceCatalog;

/// The best catalog this build supports for the running host
pub fn system_catalog() -> Box<dyn DeviceCatalog> {
    #[cfg(all(target_os = "linux", feature = "alsa"))]
    {
        tracing::debug!("Using ALSA device catalog");
        Box::new(AlsaCatalog::new())
    }

    #[cfg(not(all(target_os = "linux", feature = "alsa")))]
    {
        tracing::debug!("Using sysfs device catalog");
        Box::new(SysfsCatalog::new())
    }
}
