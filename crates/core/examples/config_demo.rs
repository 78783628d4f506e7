//! Example walking through configuration loading and volume planning
//!
//! Run with: cargo run --package rigfinder-core --example config_demo

use rigfinder_core::domain::config::{
    AudioSearchConfig, ConfigManager, ControlVolumeConfig, RigfinderConfig, VolumeConfig,
};
use rigfinder_core::domain::memory::{MemoryCatalog, MemoryTree};
use rigfinder_core::domain::mixer::{ChannelId, ChannelType, MixerChannelState, MixerControl, RawRange};
use rigfinder_core::domain::search::{self, SearchMode};
use rigfinder_core::domain::volume;
use rigfinder_core::domain::{AudioDevice, DeviceType};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("rigfinder_core=debug,info")
        .init();

    println!("=== rigfinder Configuration Demo ===\n");

    // 1. Build a configuration
    println!("1. Building configuration...");
    let mut config = RigfinderConfig {
        search_mode: SearchMode::AudioSiblings,
        ..Default::default()
    };
    config.search.audio = AudioSearchConfig {
        description: "C-Media".to_string(),
        device_type: "playback&capture".to_string(),
        ..Default::default()
    };
    config.volume = VolumeConfig {
        capture_value: Some(40),
        max_error_percent: 2,
        controls: vec![ControlVolumeConfig {
            name: "Speaker".to_string(),
            playback_value: Some(75),
            ..Default::default()
        }],
        ..Default::default()
    };

    // 2. Save it where ConfigManager looks
    let config_dir = tempfile::tempdir()?;
    let manager = ConfigManager::new(config_dir.path().to_path_buf());
    config.save_to_file(manager.config_path()).await?;
    println!("   ✓ Saved to {}", manager.config_path().display());

    // 3. Load it back
    let loaded = manager.load().await?;
    println!("\n2. Loaded configuration:");
    println!("   search mode: {}", loaded.search_mode);
    for request in loaded.requests()? {
        println!(
            "   - {}% on control {:?}, type {:?}, specificity {}",
            request.target_percent,
            request.control_name,
            request.channel_type,
            request.specificity()
        );
    }

    // 4. Plan against a simulated dongle
    println!("\n3. Planning volumes for a simulated dongle...");
    let device = AudioDevice::new(1, 0, "USB Audio", "USB Audio", "C-Media USB Audio Device", DeviceType::DUPLEX);
    let mut catalog = MemoryCatalog::new(MemoryTree::new());
    catalog.add_audio_device(device);
    catalog.set_mixer(
        1,
        vec![
            MixerControl {
                name: "Speaker".to_string(),
                channels: [ChannelId::FrontLeft, ChannelId::FrontRight]
                    .into_iter()
                    .map(|id| MixerChannelState {
                        id,
                        channel_type: ChannelType::Playback,
                        range: RawRange { min: 0, max: 37 },
                        value: 0,
                        db_range: None,
                        db_value: None,
                    })
                    .collect(),
            },
            MixerControl {
                name: "Mic".to_string(),
                channels: vec![MixerChannelState {
                    id: ChannelId::Mono,
                    channel_type: ChannelType::Capture,
                    range: RawRange { min: 0, max: 16 },
                    value: 0,
                    db_range: None,
                    db_value: None,
                }],
            },
        ],
    );

    // No topology in this catalog, so search independently
    let result = search::search(&catalog, &loaded.to_filters()?, SearchMode::Independent)?;
    let mut plan = volume::resolve_volume_plan(&result.volumes(), &loaded.requests()?);
    for entry in plan.entries() {
        println!(
            "   {} '{}' {} {} -> {}%",
            entry.key.hw_id,
            entry.key.control,
            entry.key.channel_type,
            entry.key.channel_id,
            entry.request.target_percent
        );
    }

    // 5. Apply and verify
    println!("\n4. Applying and verifying...");
    let applied = volume::apply(&catalog, &plan);
    println!("   ✓ Applied {} channel(s)", applied.applied_count());
    let report = volume::verify(&catalog, &mut plan);
    for m in &report.measurements {
        println!(
            "   {} {}: requested {}%, got {:?} (error {})",
            m.key.control, m.key.channel_id, m.requested, m.actual, m.error
        );
    }
    println!("   verification {}", if report.passed() { "passed" } else { "failed" });

    println!("\n=== Demo Complete ===");
    Ok(())
}
