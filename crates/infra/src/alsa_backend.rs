//! ALSA-based device catalog
//!
//! Cards and PCM devices come from the ALSA control interface, mixers from
//! the simple mixer interface. Every call opens its own handles and drops
//! them before returning. Topology and serial ports come from sysfs.

use crate::sysfs::{self, SysfsTree};
use alsa::card::Card;
use alsa::ctl::{Ctl, DeviceIter};
use alsa::mixer::{Mixer, Selem, SelemChannelId, SelemId};
use alsa::Direction;
use rigfinder_core::domain::audio::{
    AudioDevice, DeviceCatalog, DeviceError, DeviceType, Result, SerialPort,
};
use rigfinder_core::domain::mixer::{
    ChannelId, ChannelType, DbRange, MixerChannelState, MixerControl, RawRange,
};
use rigfinder_core::domain::topology::DeviceTree;
use tracing::{debug, instrument, trace, warn};

fn hardware_error(context: &str, e: alsa::Error) -> DeviceError {
    DeviceError::HardwareIo(format!("{}: {}", context, e))
}

#[derive(Debug, Clone, Default)]
pub struct AlsaCatalog {
    tree: SysfsTree,
}

impl AlsaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: SysfsTree) -> Self {
        Self { tree }
    }

    /// PCM devices of one card. Directions the device lacks are probed and skipped.
    fn card_devices(&self, card: &Card) -> Result<Vec<AudioDevice>> {
        let card_id = u32::try_from(card.get_index())
            .map_err(|_| DeviceError::NotFound("card with negative index".to_string()))?;
        let name = card.get_name().unwrap_or_else(|_| "Unknown".to_string());
        let long_name = card.get_longname().unwrap_or_else(|_| "Unknown".to_string());

        let ctl = Ctl::from_card(card, false)
            .map_err(|e| hardware_error(&format!("hw:{}", card_id), e))?;

        let mut devices = Vec::new();
        for device_id in DeviceIter::new(&ctl) {
            let Ok(device_id) = u32::try_from(device_id) else {
                continue;
            };

            let mut device_type = DeviceType::UNKNOWN;
            let mut stream_name = String::new();
            for (direction, flag) in [
                (Direction::Capture, DeviceType::CAPTURE),
                (Direction::Playback, DeviceType::PLAYBACK),
            ] {
                if let Ok(info) = ctl.pcm_info(device_id, 0, direction) {
                    device_type |= flag;
                    if stream_name.is_empty() {
                        stream_name = info.get_name().map(str::to_string).unwrap_or_default();
                    }
                }
            }

            if device_type == DeviceType::UNKNOWN {
                trace!(card = card_id, device = device_id, "PCM device has no streams");
                continue;
            }

            devices.push(AudioDevice::new(
                card_id,
                device_id,
                name.clone(),
                stream_name,
                long_name.clone(),
                device_type,
            ));
        }
        Ok(devices)
    }
}

fn open_mixer(device: &AudioDevice) -> Result<Mixer> {
    let name = format!("hw:{}", device.card_id);
    Mixer::new(&name, false).map_err(|e| hardware_error(&name, e))
}

fn playback_channels(selem: &Selem) -> Vec<MixerChannelState> {
    let (min, max) = selem.get_playback_volume_range();
    let (db_min, db_max) = selem.get_playback_db_range();

    SelemChannelId::all()
        .iter()
        .filter(|&&ch| selem.has_playback_channel(ch))
        .filter_map(|&ch| {
            let value = selem.get_playback_volume(ch).ok()?;
            let db_value = selem.get_playback_vol_db(ch).ok().map(|db| db.0);
            Some(MixerChannelState {
                id: channel_id(selem.is_playback_mono(), ch),
                channel_type: ChannelType::Playback,
                range: RawRange { min, max },
                value,
                db_range: db_value.map(|_| DbRange { min: db_min.0, max: db_max.0 }),
                db_value,
            })
        })
        .collect()
}

fn capture_channels(selem: &Selem) -> Vec<MixerChannelState> {
    let (min, max) = selem.get_capture_volume_range();
    let (db_min, db_max) = selem.get_capture_db_range();

    SelemChannelId::all()
        .iter()
        .filter(|&&ch| selem.has_capture_channel(ch))
        .filter_map(|&ch| {
            let value = selem.get_capture_volume(ch).ok()?;
            let db_value = selem.get_capture_vol_db(ch).ok().map(|db| db.0);
            Some(MixerChannelState {
                id: channel_id(selem.is_capture_mono(), ch),
                channel_type: ChannelType::Capture,
                range: RawRange { min, max },
                value,
                db_range: db_value.map(|_| DbRange { min: db_min.0, max: db_max.0 }),
                db_value,
            })
        })
        .collect()
}

fn channel_id(mono: bool, ch: SelemChannelId) -> ChannelId {
    if mono {
        ChannelId::Mono
    } else {
        ChannelId::from_position(ch as i32)
    }
}

fn selem_channel(id: ChannelId) -> SelemChannelId {
    match id {
        ChannelId::FrontLeft | ChannelId::Mono | ChannelId::None => SelemChannelId::FrontLeft,
        ChannelId::FrontRight => SelemChannelId::FrontRight,
        ChannelId::RearLeft => SelemChannelId::RearLeft,
        ChannelId::RearRight => SelemChannelId::RearRight,
        ChannelId::FrontCenter => SelemChannelId::FrontCenter,
        ChannelId::Woofer => SelemChannelId::Woofer,
        ChannelId::SideLeft => SelemChannelId::SideLeft,
        ChannelId::SideRight => SelemChannelId::SideRight,
        ChannelId::RearCenter => SelemChannelId::RearCenter,
    }
}

impl DeviceCatalog for AlsaCatalog {
    #[instrument(skip(self))]
    fn audio_devices(&self) -> Result<Vec<AudioDevice>> {
        let mut devices = Vec::new();

        for card in alsa::card::Iter::new() {
            let card = match card {
                Ok(card) => card,
                Err(e) => {
                    warn!(error = %e, "Skipping sound card");
                    continue;
                }
            };

            match self.card_devices(&card) {
                Ok(mut found) => devices.append(&mut found),
                Err(e) => warn!(card = card.get_index(), error = %e, "Skipping sound card"),
            }
        }

        debug!(count = devices.len(), "Enumerated audio devices");
        Ok(devices)
    }

    fn serial_ports(&self) -> Result<Vec<SerialPort>> {
        Ok(sysfs::usb_serial_ports(&self.tree))
    }

    fn tree(&self) -> &dyn DeviceTree {
        &self.tree
    }

    #[instrument(skip(self), fields(device = %device.hw_id))]
    fn mixer_controls(&self, device: &AudioDevice) -> Result<Vec<MixerControl>> {
        let mixer = open_mixer(device)?;
        let mut controls = Vec::new();

        for elem in mixer.iter() {
            let Some(selem) = Selem::new(elem) else {
                continue;
            };
            if !selem.has_playback_volume() && !selem.has_capture_volume() {
                continue;
            }

            let name = selem
                .get_id()
                .get_name()
                .map(str::to_string)
                .map_err(|e| hardware_error("mixer element name", e))?;

            let mut channels = Vec::new();
            if selem.has_playback_volume() {
                channels.extend(playback_channels(&selem));
            }
            if selem.has_capture_volume() {
                channels.extend(capture_channels(&selem));
            }
            controls.push(MixerControl { name, channels });
        }

        Ok(controls)
    }

    #[instrument(skip(self), fields(device = %device.hw_id))]
    fn write_channel_raw(
        &self,
        device: &AudioDevice,
        control: &str,
        channel: ChannelId,
        channel_type: ChannelType,
        raw_value: i64,
    ) -> Result<()> {
        let mixer = open_mixer(device)?;
        let selem = mixer
            .find_selem(&SelemId::new(control, 0))
            .ok_or_else(|| DeviceError::NotFound(format!("control '{}' on {}", control, device.hw_id)))?;

        let ch = selem_channel(channel);
        match channel_type {
            ChannelType::Playback => selem.set_playback_volume(ch, raw_value),
            ChannelType::Capture => selem.set_capture_volume(ch, raw_value),
        }
        .map_err(|e| hardware_error(&format!("set '{}' {}", control, channel), e))
    }
}
