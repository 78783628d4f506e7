//! Shared fixtures for the integration tests
//!
//! The simulated host has two USB sound-card dongles, each paired with a
//! CP2102N serial adapter behind the same hub, plus the onboard HDA card.

use rigfinder_core::domain::audio::{AudioDevice, DeviceType, SerialPort};
use rigfinder_core::domain::memory::{MemoryCatalog, MemoryTree};
use rigfinder_core::domain::mixer::{
    ChannelId, ChannelType, DbRange, MixerChannelState, MixerControl, RawRange,
};

pub const PCI: &str = "/sys/devices/pci0000:00/0000:00:14.0";
pub const HUB_A: &str = "/sys/devices/pci0000:00/0000:00:14.0/usb2/2-1";
pub const HUB_B: &str = "/sys/devices/pci0000:00/0000:00:14.0/usb2/2-2";

pub fn channel(id: ChannelId, channel_type: ChannelType, max: i64) -> MixerChannelState {
    MixerChannelState {
        id,
        channel_type,
        range: RawRange { min: 0, max },
        value: max / 2,
        db_range: None,
        db_value: None,
    }
}

/// The C-Media dongle mixer: stereo speaker with a 0..37 range, mono mic 0..31
pub fn cmedia_mixer() -> Vec<MixerControl> {
    vec![
        MixerControl {
            name: "Speaker".to_string(),
            channels: vec![
                MixerChannelState {
                    db_range: Some(DbRange { min: -3700, max: 0 }),
                    db_value: Some(-1900),
                    ..channel(ChannelId::FrontLeft, ChannelType::Playback, 37)
                },
                MixerChannelState {
                    db_range: Some(DbRange { min: -3700, max: 0 }),
                    db_value: Some(-1900),
                    ..channel(ChannelId::FrontRight, ChannelType::Playback, 37)
                },
            ],
        },
        MixerControl {
            name: "Mic".to_string(),
            channels: vec![
                channel(ChannelId::Mono, ChannelType::Playback, 31),
                channel(ChannelId::Mono, ChannelType::Capture, 31),
            ],
        },
        MixerControl {
            name: "Auto Gain Control".to_string(),
            channels: vec![],
        },
    ]
}

/// Build the simulated host described in the module docs
///
/// Dongle A: sound card 1 at bus 2 device 48, ttyUSB0 at device 49.
/// Dongle B: sound card 2 at bus 2 device 52, ttyUSB1 at device 53.
pub fn dongle_host() -> MemoryCatalog {
    let mut tree = MemoryTree::new();
    tree.add("/sys/devices/pci0000:00", None, None);
    tree.add(PCI, Some("pci"), None);
    tree.add_usb_device(&format!("{PCI}/usb2"), 2, 1);

    for (hub, hub_dev, card, tty) in [(HUB_A, 47, 1u32, "ttyUSB0"), (HUB_B, 51, 2u32, "ttyUSB1")] {
        let sysname = hub.rsplit('/').next().unwrap_or_default();
        tree.add_usb_device(hub, 2, hub_dev);

        let audio = format!("{hub}/{sysname}.1");
        tree.add_usb_device(&audio, 2, hub_dev + 1)
            .attributes
            .insert("product".to_string(), "USB Audio Device".to_string());
        tree.add(&format!("{audio}/{sysname}.1:1.0"), Some("usb"), Some("usb_interface"));
        tree.add_sound_card(&format!("{audio}/{sysname}.1:1.0/sound/card{card}"), card);

        let serial = format!("{hub}/{sysname}.3");
        tree.add_usb_device(&serial, 2, hub_dev + 2);
        tree.add(&format!("{serial}/{sysname}.3:1.0"), Some("usb"), Some("usb_interface"));
        tree.add_tty(
            &format!("{serial}/{sysname}.3:1.0/{tty}/tty/{tty}"),
            &format!("/dev/{tty}"),
        );
    }

    // Onboard card without a USB parent
    tree.add_sound_card(&format!("{PCI}/sound/card0"), 0);

    let mut catalog = MemoryCatalog::new(tree);
    catalog.add_audio_device(AudioDevice::new(0, 0, "HDA Intel PCH", "ALC887 Analog", "HDA Intel PCH at 0xf7f10000", DeviceType::DUPLEX));
    catalog.add_audio_device(AudioDevice::new(0, 3, "HDA Intel PCH", "HDMI 0", "HDA Intel PCH at 0xf7f10000", DeviceType::PLAYBACK));
    for card in [1, 2] {
        catalog.add_audio_device(AudioDevice::new(
            card,
            0,
            "USB Audio Device",
            "USB Audio",
            "C-Media Electronics Inc. USB Audio Device",
            DeviceType::DUPLEX,
        ));
        catalog.set_mixer(card, cmedia_mixer());
    }

    for (name, serial) in [("/dev/ttyUSB0", "a7c1"), ("/dev/ttyUSB1", "b3f2")] {
        catalog.add_serial_port(SerialPort {
            name: name.to_string(),
            description: "CP2102N USB to UART Bridge Controller".to_string(),
            manufacturer: "Silicon Labs".to_string(),
            device_serial_number: serial.to_string(),
        });
    }
    catalog.add_serial_port(SerialPort {
        name: "/dev/ttyS0".to_string(),
        ..Default::default()
    });

    catalog
}
