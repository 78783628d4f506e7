//! rigfinder core: device model, topology resolution, filtering and volume control

pub mod domain;
