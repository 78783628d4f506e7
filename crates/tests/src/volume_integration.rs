//! Integration tests for volume control
//!
//! Plans, applies, verifies and probes volumes on the simulated dongles

use rigfinder_core::domain::audio::{DeviceCatalog, DeviceError};
use rigfinder_core::domain::config::RigfinderConfig;
use rigfinder_core::domain::filter::{AudioFilter, TopologyCriteria};
use rigfinder_core::domain::memory::MemoryCatalog;
use rigfinder_core::domain::mixer::{ChannelId, ChannelType, VolumeInfo};
use rigfinder_core::domain::search::{search, SearchFilters, SearchMode};
use rigfinder_core::domain::volume::{
    apply, probe, resolve_volume_plan, verify, PlanKey, VolumeSetRequest,
};
use rigfinder_infra::SysfsCatalog;
use rigfinder_tests::dongle_host;
use std::collections::HashSet;
use tempfile::TempDir;

/// Mixer snapshot of dongle A only
fn dongle_a(catalog: &MemoryCatalog) -> Vec<VolumeInfo> {
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
    search(catalog, &filters, SearchMode::AudioSiblings)
        .unwrap()
        .volumes()
}

fn key(hw_id: &str, control: &str, channel_id: ChannelId, channel_type: ChannelType) -> PlanKey {
    PlanKey {
        hw_id: hw_id.to_string(),
        control: control.to_string(),
        channel_id,
        channel_type,
    }
}

fn playback(percent: u8) -> VolumeSetRequest {
    VolumeSetRequest::new(percent).of_type(ChannelType::Playback)
}

// ============================================================================
// PLAN RESOLUTION TESTS
// ============================================================================

#[test]
fn test_most_specific_request_wins() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);

    let requests = vec![
        playback(50),
        playback(60).for_control("Speaker"),
        playback(70)
            .for_control("Speaker")
            .on_channels(vec![ChannelId::FrontLeft]),
    ];
    let plan = resolve_volume_plan(&volumes, &requests);

    let targets: Vec<_> = plan
        .entries()
        .iter()
        .map(|e| (e.key.control.as_str(), e.key.channel_id, e.request.target_percent))
        .collect();
    assert_eq!(
        targets,
        vec![
            ("Speaker", ChannelId::FrontLeft, 70),
            ("Speaker", ChannelId::FrontRight, 60),
            ("Mic", ChannelId::Mono, 50),
        ]
    );
}

#[test]
fn test_request_order_does_not_beat_specificity() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);

    let requests = vec![
        playback(70)
            .for_control("Speaker")
            .on_channels(vec![ChannelId::FrontLeft]),
        playback(50),
    ];
    let plan = resolve_volume_plan(&volumes, &requests);

    let front_left = key("hw:1,0", "Speaker", ChannelId::FrontLeft, ChannelType::Playback);
    assert_eq!(plan.get(&front_left).unwrap().request.target_percent, 70);
    assert_eq!(plan.get(&front_left).unwrap().specificity, 2);
}

#[test]
fn test_first_request_wins_a_tie() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);

    let plan = resolve_volume_plan(&volumes, &[playback(30), playback(80)]);
    assert_eq!(plan.len(), 3);
    assert!(plan.entries().iter().all(|e| e.request.target_percent == 30));
}

#[test]
fn test_plan_keys_are_unique_across_devices() {
    let catalog = dongle_host();
    let result = search(&catalog, &SearchFilters::default(), SearchMode::Independent).unwrap();

    let requests = vec![
        VolumeSetRequest::new(40),
        VolumeSetRequest::new(40).for_control("Mic"),
        VolumeSetRequest::new(40).of_type(ChannelType::Capture),
    ];
    let plan = resolve_volume_plan(&result.volumes(), &requests);

    // Two dongles with four channels each; the onboard card has no mixer
    assert_eq!(plan.len(), 8);
    let keys: HashSet<_> = plan.entries().iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys.len(), plan.len());
}

#[test]
fn test_channel_type_restricts_plan() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);

    let plan = resolve_volume_plan(
        &volumes,
        &[VolumeSetRequest::new(20).of_type(ChannelType::Capture)],
    );
    assert_eq!(plan.len(), 1);
    assert_eq!(
        plan.entries()[0].key,
        key("hw:1,0", "Mic", ChannelId::Mono, ChannelType::Capture)
    );
}

// ============================================================================
// APPLY AND VERIFY TESTS
// ============================================================================

#[test]
fn test_apply_writes_linear_raw_values() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);
    let plan = resolve_volume_plan(&volumes, &[playback(50)]);

    let report = apply(&catalog, &plan);
    assert_eq!(report.applied_count(), 3);

    let raw: Vec<_> = report.outcomes.iter().map(|o| o.raw_value).collect();
    // 18.5 and 15.5 round to even
    assert_eq!(raw, vec![18, 18, 16]);
}

#[test]
fn test_verify_within_tolerance() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);
    let mut plan = resolve_volume_plan(&volumes, &[playback(50).with_max_error(2)]);

    apply(&catalog, &plan);
    let report = verify(&catalog, &mut plan);
    assert!(report.passed());

    let actual: Vec<_> = report.measurements.iter().map(|m| m.actual).collect();
    assert_eq!(actual, vec![Some(49), Some(49), Some(52)]);
    assert_eq!(plan.entries()[2].measured_error, Some(2));
}

#[test]
fn test_verify_with_zero_tolerance_fails() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);
    let mut plan = resolve_volume_plan(&volumes, &[playback(50)]);

    apply(&catalog, &plan);
    let report = verify(&catalog, &mut plan);
    assert!(!report.passed());
    assert_eq!(report.failures().count(), 3);
    assert!(matches!(
        report.into_result(),
        Err(DeviceError::ToleranceExceeded { count: 3 })
    ));
}

#[test]
fn test_exact_targets_verify_cleanly() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);
    let mut plan = resolve_volume_plan(&volumes, &[playback(100), playback(0).for_control("Mic")]);

    apply(&catalog, &plan);
    let report = verify(&catalog, &mut plan);
    assert!(report.passed());
    assert!(report.measurements.iter().all(|m| m.error == 0));
}

#[test]
fn test_failed_write_is_recorded_and_others_proceed() {
    let mut catalog = dongle_host();
    catalog.fail_writes(1, "Mic");
    let volumes = dongle_a(&catalog);
    let mut plan = resolve_volume_plan(&volumes, &[playback(100)]);

    let report = apply(&catalog, &plan);
    assert_eq!(report.applied_count(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key.control, "Mic");

    // The untouched Mic channel still reads 15 of 31
    let verify_report = verify(&catalog, &mut plan);
    let failed: Vec<_> = verify_report.failures().map(|m| m.key.control.as_str()).collect();
    assert_eq!(failed, vec!["Mic"]);
}

#[test]
fn test_refreshed_volumes_reflect_applied_plan() {
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
    let mut result = search(&catalog, &filters, SearchMode::Independent).unwrap();

    let plan = resolve_volume_plan(&result.volumes(), &[playback(100).for_control("Speaker")]);
    apply(&catalog, &plan);
    result.refresh_volumes(&catalog);

    let speaker = result.audio_devices[0].volume.control("Speaker").unwrap();
    assert!(speaker.channels.iter().all(|c| c.raw_value == 37));
    assert!(speaker.channels.iter().all(|c| c.volume_percent == 100));
}

#[test]
fn test_config_requests_drive_the_plan() {
    let config: RigfinderConfig = toml::from_str(
        r#"
        [volume]
        capture_value = 25
        max_error_percent = 3

        [[volume.controls]]
        name = "Speaker"
        playback_value = 80

        [[volume.controls.channels]]
        channels = "Front Right"
        playback_value = 20
        "#,
    )
    .unwrap();

    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);
    let mut plan = resolve_volume_plan(&volumes, &config.requests().unwrap());
    assert_eq!(plan.len(), 3);

    apply(&catalog, &plan);
    assert!(verify(&catalog, &mut plan).passed());

    let front_right = key("hw:1,0", "Speaker", ChannelId::FrontRight, ChannelType::Playback);
    assert_eq!(plan.get(&front_right).unwrap().request.target_percent, 20);
}

// ============================================================================
// PROBE TESTS
// ============================================================================

#[test]
fn test_probe_reports_every_step() {
    let catalog = dongle_host();
    let volumes = dongle_a(&catalog);

    let results = probe(&catalog, &volumes);
    assert_eq!(results.len(), 4);

    let steps: Vec<_> = results.iter().map(|r| r.distinct_steps()).collect();
    assert_eq!(steps, vec![38, 38, 32, 32]);
    for result in &results {
        assert_eq!(result.samples.len(), 101);
        assert!(result.is_monotonic());
        assert!(result.error.is_none());
        assert!(result.restored);
    }
}

#[test]
fn test_probe_restores_original_volumes() {
    let catalog = dongle_host();
    let before = dongle_a(&catalog);

    probe(&catalog, &before);

    let after = dongle_a(&catalog);
    assert_eq!(before, after);
}

#[test]
fn test_probe_stops_on_write_failure() {
    let mut catalog = dongle_host();
    catalog.fail_writes(1, "Speaker");
    let volumes = dongle_a(&catalog);

    let results = probe(&catalog, &volumes);
    let speaker = &results[0];
    assert!(speaker.samples.is_empty());
    assert!(speaker.error.is_some());
    assert!(!speaker.restored);

    let mic = &results[2];
    assert!(mic.error.is_none());
}

// ============================================================================
// PROCFS CATALOG TESTS
// ============================================================================

#[test]
fn test_catalog_without_mixers_plans_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let asound = temp_dir.path().join("asound");
    std::fs::create_dir_all(asound.join("card1/pcm0p")).unwrap();
    std::fs::create_dir_all(asound.join("card1/pcm0c")).unwrap();
    std::fs::write(asound.join("card1/pcm0p/info"), "card: 1\ndevice: 0\nname: USB Audio\n").unwrap();
    std::fs::write(
        asound.join("cards"),
        " 1 [Device         ]: USB-Audio - USB Audio Device\n                      C-Media Electronics Inc. USB Audio Device\n",
    )
    .unwrap();

    let catalog = SysfsCatalog::with_roots(temp_dir.path().join("sys"), asound);
    let devices = catalog.audio_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].stream_name, "USB Audio");

    let result = search(&catalog, &SearchFilters::default(), SearchMode::Independent).unwrap();
    assert!(result.audio_devices[0].description.is_none());
    assert!(result.audio_devices[0].volume.controls.is_empty());

    let plan = resolve_volume_plan(&result.volumes(), &[VolumeSetRequest::new(50)]);
    assert!(plan.is_empty());
}
