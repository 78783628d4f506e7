//! Integration tests for device search
//!
//! Runs full searches over a simulated host with two USB dongles

use rigfinder_core::domain::audio::DeviceCatalog;
use rigfinder_core::domain::config::RigfinderConfig;
use rigfinder_core::domain::filter::{AudioFilter, PortFilter, TopologyCriteria};
use rigfinder_core::domain::memory::HostFixture;
use rigfinder_core::domain::search::{search, IncludedDevices, SearchFilters, SearchMode};
use rigfinder_tests::{dongle_host, HUB_A, HUB_B};
use tempfile::TempDir;

fn audio_names(filters: &SearchFilters, mode: SearchMode) -> (Vec<String>, Vec<String>) {
    let catalog = dongle_host();
    let result = search(&catalog, filters, mode).unwrap();
    (
        result.audio_devices.iter().map(|m| m.device.hw_id.clone()).collect(),
        result.serial_ports.iter().map(|m| m.item.name.clone()).collect(),
    )
}

// ============================================================================
// INDEPENDENT SEARCH TESTS
// ============================================================================

#[test]
fn test_unfiltered_search_lists_everything() {
    let (audio, ports) = audio_names(&SearchFilters::default(), SearchMode::Independent);
    assert_eq!(audio, vec!["hw:0,0", "hw:0,3", "hw:1,0", "hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyS0"]);
}

#[test]
fn test_name_filter_is_case_insensitive() {
    let filters = SearchFilters {
        audio: AudioFilter {
            name: "usb audio".to_string(),
            ..Default::default()
        },
        port: PortFilter {
            manufacturer: "silicon".to_string(),
            ..Default::default()
        },
    };

    let (audio, ports) = audio_names(&filters, SearchMode::Independent);
    assert_eq!(audio, vec!["hw:1,0", "hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
}

#[test]
fn test_type_filter() {
    let filters = SearchFilters {
        audio: AudioFilter {
            device_type: "playback".parse().unwrap(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, _) = audio_names(&filters, SearchMode::Independent);
    assert_eq!(audio, vec!["hw:0,3"]);
}

#[test]
fn test_topology_filter_drops_devices_without_usb_parent() {
    let filters = SearchFilters {
        audio: AudioFilter {
            topology: TopologyCriteria {
                bus_number: 2,
                ..Default::default()
            },
            ..Default::default()
        },
        port: PortFilter {
            topology: TopologyCriteria {
                bus_number: 2,
                ..Default::default()
            },
            ..Default::default()
        },
    };

    let (audio, ports) = audio_names(&filters, SearchMode::Independent);
    assert_eq!(audio, vec!["hw:1,0", "hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
}

#[test]
fn test_path_prefix_filter() {
    let filters = SearchFilters {
        audio: AudioFilter {
            topology: TopologyCriteria {
                path: HUB_B.to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, _) = audio_names(&filters, SearchMode::Independent);
    assert_eq!(audio, vec!["hw:2,0"]);
}

#[test]
fn test_description_reports_usb_position() {
    let catalog = dongle_host();
    let result = search(&catalog, &SearchFilters::default(), SearchMode::Independent).unwrap();

    let onboard = &result.audio_devices[0];
    assert!(onboard.description.is_none());

    let dongle = &result.audio_devices[2];
    let desc = dongle.description.as_ref().unwrap();
    assert_eq!(desc.bus_number, 2);
    assert_eq!(desc.device_number, 48);
    assert_eq!(desc.topology_depth, 3);
    assert_eq!(desc.hw_path, format!("{HUB_A}/2-1.1"));
    assert_eq!(desc.product, "USB Audio Device");
}

// ============================================================================
// SIBLING SEARCH TESTS
// ============================================================================

#[test]
fn test_audio_siblings_pairs_dongle() {
    let filters = SearchFilters {
        audio: AudioFilter {
            topology: TopologyCriteria {
                bus_number: 2,
                device_number: 48,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, ports) = audio_names(&filters, SearchMode::AudioSiblings);
    assert_eq!(audio, vec!["hw:1,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0"]);
}

#[test]
fn test_port_siblings_pairs_dongle() {
    let filters = SearchFilters {
        port: PortFilter {
            device_serial_number: "B3F2".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, ports) = audio_names(&filters, SearchMode::PortSiblings);
    assert_eq!(audio, vec!["hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB1"]);
}

#[test]
fn test_siblings_of_every_dongle() {
    let filters = SearchFilters {
        audio: AudioFilter {
            description: "C-Media".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, ports) = audio_names(&filters, SearchMode::AudioSiblings);
    assert_eq!(audio, vec!["hw:1,0", "hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
}

#[test]
fn test_port_filter_applies_to_siblings() {
    let filters = SearchFilters {
        audio: AudioFilter {
            description: "C-Media".to_string(),
            ..Default::default()
        },
        port: PortFilter {
            device_serial_number: "a7c1".to_string(),
            ..Default::default()
        },
    };

    let (audio, ports) = audio_names(&filters, SearchMode::AudioSiblings);
    assert_eq!(audio, vec!["hw:1,0", "hw:2,0"]);
    assert_eq!(ports, vec!["/dev/ttyUSB0"]);
}

#[test]
fn test_onboard_card_has_no_siblings() {
    let filters = SearchFilters {
        audio: AudioFilter {
            name: "HDA".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (audio, ports) = audio_names(&filters, SearchMode::AudioSiblings);
    assert_eq!(audio.len(), 2);
    assert!(ports.is_empty());
}

// ============================================================================
// RESULT TESTS
// ============================================================================

#[test]
fn test_included_devices_and_count() {
    let catalog = dongle_host();
    let filters = SearchFilters {
        audio: AudioFilter {
            description: "C-Media".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let result = search(&catalog, &filters, SearchMode::AudioSiblings).unwrap();
    assert_eq!(result.result_count(), 2);

    let ports_only = result.clone().restrict(IncludedDevices::Ports);
    assert!(ports_only.audio_devices.is_empty());
    assert_eq!(ports_only.serial_ports.len(), 2);

    let audio_only = result.restrict(IncludedDevices::Audio);
    assert!(audio_only.serial_ports.is_empty());
    assert_eq!(audio_only.result_count(), 2);
}

#[test]
fn test_search_attaches_volume_snapshots() {
    let catalog = dongle_host();
    let result = search(&catalog, &SearchFilters::default(), SearchMode::Independent).unwrap();

    // The onboard card has no mixer in the fixture
    assert!(result.audio_devices[0].volume.controls.is_empty());

    let dongle = &result.audio_devices[2].volume;
    let speaker = dongle.control("Speaker").unwrap();
    assert_eq!(speaker.channels.len(), 2);
    assert_eq!(speaker.channels[0].raw_value, 18);
}

#[test]
fn test_json_output_shape() {
    let catalog = dongle_host();
    let filters = SearchFilters {
        audio: AudioFilter {
            topology: TopologyCriteria {
                device_number: 48,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let result = search(&catalog, &filters, SearchMode::AudioSiblings).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    let audio = &json["audio_devices"][0];
    assert_eq!(audio["hw_id"], "hw:1,0");
    assert_eq!(audio["plughw_id"], "plughw:1,0");
    assert_eq!(audio["description"], "C-Media Electronics Inc. USB Audio Device");
    assert_eq!(audio["bus_number"], 2);
    assert_eq!(json["serial_ports"][0]["name"], "/dev/ttyUSB0");
    assert_eq!(json["serial_ports"][0]["hw_path"], format!("{HUB_A}/2-1.3"));
}

// ============================================================================
// FILE-DRIVEN TESTS
// ============================================================================

const HOST: &str = r#"
[[audio]]
card_id = 3
device_id = 0
name = "USB Audio"
description = "Generic USB Audio"
type = "capture&playback"

[[ports]]
name = "/dev/ttyACM0"
description = "Radio interface"

[[nodes]]
syspath = "/sys/devices/usb3"
subsystem = "usb"
devtype = "usb_device"
attributes = { busnum = "3", devnum = "1" }

[[nodes]]
syspath = "/sys/devices/usb3/3-4"
subsystem = "usb"
devtype = "usb_device"
attributes = { busnum = "3", devnum = "7" }

[[nodes]]
syspath = "/sys/devices/usb3/3-4/3-4.1"
subsystem = "usb"
devtype = "usb_device"
attributes = { busnum = "3", devnum = "8", idVendor = "0d8c", idProduct = "0012" }

[[nodes]]
syspath = "/sys/devices/usb3/3-4/3-4.1/sound/card3"
subsystem = "sound"
attributes = { number = "3" }

[[nodes]]
syspath = "/sys/devices/usb3/3-4/3-4.2"
subsystem = "usb"
devtype = "usb_device"
attributes = { busnum = "3", devnum = "9" }

[[nodes]]
syspath = "/sys/devices/usb3/3-4/3-4.2/tty/ttyACM0"
subsystem = "tty"
devnode = "/dev/ttyACM0"
"#;

#[tokio::test]
async fn test_search_over_fixture_file() {
    let temp_dir = TempDir::new().unwrap();
    let host_path = temp_dir.path().join("host.toml");
    tokio::fs::write(&host_path, HOST).await.unwrap();

    let config_path = temp_dir.path().join("rigfinder.toml");
    tokio::fs::write(
        &config_path,
        "search_mode = \"port_siblings\"\n[search.port]\nname = \"ttyACM\"\n",
    )
    .await
    .unwrap();

    let catalog = HostFixture::load_from_file(&host_path)
        .await
        .unwrap()
        .into_catalog();
    let config = RigfinderConfig::load_from_file(&config_path).await.unwrap();

    let result = search(&catalog, &config.to_filters().unwrap(), config.search_mode).unwrap();
    assert_eq!(result.audio_devices.len(), 1);
    assert_eq!(result.audio_devices[0].device.hw_id, "hw:3,0");
    assert_eq!(
        result.audio_devices[0].description.as_ref().unwrap().id_vendor,
        "0d8c"
    );
    assert_eq!(result.result_count(), config.expected_count);
}

#[tokio::test]
async fn test_missing_fixture_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = HostFixture::load_from_file(&temp_dir.path().join("missing.toml")).await;
    assert!(result.is_err());
}

#[test]
fn test_catalog_lists_are_stable() {
    let catalog = dongle_host();
    assert_eq!(catalog.audio_devices().unwrap().len(), 4);
    assert_eq!(catalog.serial_ports().unwrap().len(), 3);
}
