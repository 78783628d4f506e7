//! rigfinder CLI Application
//!
//! Finds USB audio devices and serial ports, pairs them by USB topology and
//! sets mixer volumes on the audio devices found.

mod render;

use anyhow::Context;
use clap::{Args, Parser};
use render::RunReport;
use rigfinder_core::domain::audio::DeviceCatalog;
use rigfinder_core::domain::config::{ConfigManager, RigfinderConfig};
use rigfinder_core::domain::memory::HostFixture;
use rigfinder_core::domain::mixer::{ChannelId, ChannelType};
use rigfinder_core::domain::search::{self, IncludedDevices, SearchMode};
use rigfinder_core::domain::volume::{self, VolumeSetRequest};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Audio device")]
struct AudioArgs {
    /// Partial or complete name of the audio device
    #[arg(long = "audio.name")]
    name: Option<String>,

    /// Partial or complete description of the audio device
    #[arg(long = "audio.desc")]
    desc: Option<String>,

    /// Partial or complete stream name of the audio device
    #[arg(long = "audio.stream-name")]
    stream_name: Option<String>,

    /// playback, capture, playback|capture, playback&capture or all
    #[arg(long = "audio.type")]
    device_type: Option<String>,

    /// USB bus number
    #[arg(long = "audio.bus")]
    bus: Option<i32>,

    /// USB device number
    #[arg(long = "audio.device")]
    device: Option<i32>,

    /// Prefix of the USB hardware path in sysfs
    #[arg(long = "audio.path")]
    path: Option<String>,

    /// Depth of the device in the USB topology
    #[arg(long = "audio.topology")]
    topology: Option<i32>,

    /// Mixer control to set, e.g. "Speaker"
    #[arg(long = "audio.control")]
    control: Option<String>,

    /// Channels to set, e.g. "Front Left, Front Right"
    #[arg(long = "audio.channels")]
    channels: Option<String>,

    /// Volume to set, in percent
    #[arg(long = "audio.volume", value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// Channel type to set: playback, capture or all
    #[arg(long = "audio.channel-type")]
    channel_type: Option<String>,

    /// Allowed verification error, in percentage points
    #[arg(long = "audio.max-error")]
    max_error: Option<u8>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Serial port")]
struct PortArgs {
    /// Partial or complete name of the serial port
    #[arg(long = "port.name")]
    name: Option<String>,

    /// Partial or complete description of the serial port
    #[arg(long = "port.desc")]
    desc: Option<String>,

    /// USB bus number
    #[arg(long = "port.bus")]
    bus: Option<i32>,

    /// USB device number
    #[arg(long = "port.device")]
    device: Option<i32>,

    /// Prefix of the USB hardware path in sysfs
    #[arg(long = "port.path")]
    path: Option<String>,

    /// Depth of the device in the USB topology
    #[arg(long = "port.topology")]
    topology: Option<i32>,

    /// Partial or complete device serial number
    #[arg(long = "port.serial")]
    serial: Option<String>,

    /// Partial or complete manufacturer name
    #[arg(long = "port.mfn")]
    manufacturer: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "rigfinder", version)]
#[command(about = "Find USB audio devices and serial ports and set their volumes", long_about = None)]
struct Cli {
    #[command(flatten)]
    audio: AudioArgs,

    #[command(flatten)]
    port: PortArgs,

    /// independent, audio-siblings or port-siblings
    #[arg(short = 's', long = "search-mode")]
    search_mode: Option<SearchMode>,

    /// audio, ports or all
    #[arg(short = 'i', long = "included-devices")]
    included_devices: Option<IncludedDevices>,

    /// Number of results the search must produce
    #[arg(short = 'e', long = "expected")]
    expected: Option<usize>,

    /// Do not change any volume
    #[arg(long = "no-volume-control", alias = "audio.disable-volume-control")]
    no_volume_control: bool,

    /// Read volumes back after setting them and fail outside tolerance
    #[arg(long)]
    verify: bool,

    /// Sweep every channel from 0 to 100% and report the readback
    #[arg(long)]
    probe: bool,

    /// Print detailed properties of each device
    #[arg(short = 'p', long = "list-properties")]
    list_properties: bool,

    /// Print JSON to stdout
    #[arg(long)]
    json: bool,

    /// Write JSON results to a file; without a name, picks output1.json, output2.json, ...
    #[arg(long = "output-file", num_args = 0..=1)]
    output_file: Option<Option<PathBuf>>,

    /// Configuration file
    #[arg(short = 'c', long = "config-file", conflicts_with = "ignore_config")]
    config_file: Option<PathBuf>,

    /// Ignore any configuration file
    #[arg(long)]
    ignore_config: bool,

    /// Simulated host description (TOML) used instead of the real hardware
    #[arg(long = "test-data")]
    test_data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command-line values win over the config file
    fn merge_into(&self, config: &mut RigfinderConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut config.search_mode, &self.search_mode);
        set(&mut config.included_devices, &self.included_devices);
        set(&mut config.expected_count, &self.expected);
        if let Some(Some(path)) = &self.output_file {
            config.output_file = Some(path.clone());
        }

        let audio = &mut config.search.audio;
        set(&mut audio.name, &self.audio.name);
        set(&mut audio.description, &self.audio.desc);
        set(&mut audio.stream_name, &self.audio.stream_name);
        set(&mut audio.device_type, &self.audio.device_type);
        set(&mut audio.topology.path, &self.audio.path);
        set_opt(&mut audio.topology.bus, &self.audio.bus);
        set_opt(&mut audio.topology.device, &self.audio.device);
        set_opt(&mut audio.topology.topology, &self.audio.topology);

        let port = &mut config.search.port;
        set(&mut port.name, &self.port.name);
        set(&mut port.description, &self.port.desc);
        set(&mut port.manufacturer, &self.port.manufacturer);
        set(&mut port.serial_number, &self.port.serial);
        set(&mut port.topology.path, &self.port.path);
        set_opt(&mut port.topology.bus, &self.port.bus);
        set_opt(&mut port.topology.device, &self.port.device);
        set_opt(&mut port.topology.topology, &self.port.topology);

        set(&mut config.volume.max_error_percent, &self.audio.max_error);
    }

    /// The volume request given on the command line, if any
    fn volume_request(&self, max_error: u8) -> anyhow::Result<Option<VolumeSetRequest>> {
        let Some(volume) = self.audio.volume else {
            return Ok(None);
        };

        let mut request = VolumeSetRequest::new(volume).with_max_error(max_error);
        if let Some(control) = &self.audio.control {
            request = request.for_control(control);
        }
        if let Some(channels) = &self.audio.channels {
            request = request.on_channels(ChannelId::parse_list(channels)?);
        }
        match self.audio.channel_type.as_deref() {
            None | Some("all") => {}
            Some(t) => request = request.of_type(t.parse::<ChannelType>()?),
        }
        Ok(Some(request))
    }
}

async fn load_config(cli: &Cli) -> anyhow::Result<RigfinderConfig> {
    if cli.ignore_config {
        return Ok(RigfinderConfig::default());
    }

    if let Some(path) = &cli.config_file {
        return RigfinderConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load config file {}", path.display()));
    }

    match ConfigManager::default_config_dir() {
        Ok(dir) => Ok(ConfigManager::new(dir).load().await?),
        Err(e) => {
            warn!(error = %e, "No default config location, using defaults");
            Ok(RigfinderConfig::default())
        }
    }
}

async fn open_catalog(cli: &Cli) -> anyhow::Result<Box<dyn DeviceCatalog>> {
    match &cli.test_data {
        Some(path) => {
            let fixture = HostFixture::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load test data {}", path.display()))?;
            Ok(Box::new(fixture.into_catalog()))
        }
        None => Ok(rigfinder_infra::system_catalog()),
    }
}

/// First `outputN.json` in `dir` that does not exist yet
async fn next_output_path(dir: &Path) -> anyhow::Result<PathBuf> {
    for n in 1u32.. {
        let candidate = dir.join(format!("output{}.json", n));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    anyhow::bail!("No free output file name in {}", dir.display())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli).await?;
    cli.merge_into(&mut config);
    debug!(?config, "Effective configuration");

    let filters = config.to_filters()?;
    let mut requests = config.requests()?;
    if let Some(request) = cli.volume_request(config.volume.max_error_percent)? {
        requests.push(request);
    }

    let catalog = open_catalog(&cli).await?;
    let catalog = catalog.as_ref();

    let mut report = RunReport {
        result: search::search(catalog, &filters, config.search_mode)?,
        ..Default::default()
    };

    let mut verify_failed = false;
    if !cli.no_volume_control && !requests.is_empty() {
        let mut plan = volume::resolve_volume_plan(&report.result.volumes(), &requests);
        report.apply = Some(volume::apply(catalog, &plan));

        if cli.verify {
            let verify = volume::verify(catalog, &mut plan);
            verify_failed = !verify.passed();
            report.verify = Some(verify);
        }
        report.plan = Some(plan);
        report.result.refresh_volumes(catalog);
    }

    if cli.probe {
        report.probe = Some(volume::probe(catalog, &report.result.volumes()));
    }

    report.result = report.result.restrict(config.included_devices);

    let json = render::to_json(&report)?;
    if cli.json {
        println!("{}", json);
    } else {
        print!("{}", render::to_text(&report, cli.list_properties)?);
    }

    let output_path = match (&config.output_file, &cli.output_file) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(None)) => Some(next_output_path(Path::new(".")).await?),
        _ => None,
    };
    if let Some(path) = output_path {
        tokio::fs::write(&path, &json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote results");
    }

    let count = report.result.result_count();
    if count == 0 {
        warn!("No devices matched the search");
        return Ok(ExitCode::FAILURE);
    }
    if count != config.expected_count {
        warn!(found = count, expected = config.expected_count, "Result count mismatch");
        return Ok(ExitCode::FAILURE);
    }
    if verify_failed {
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
