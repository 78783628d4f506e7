//! Volume control orchestration
//!
//! Volume-set requests may overlap: a global "playback at 50%" and a
//! "Speaker, Front Left at 70%" both address the front-left speaker channel.
//! [`resolve_volume_plan`] collapses them to one entry per channel, keeping
//! the most specific request. The plan can then be applied, verified
//! against a tolerance, or replaced by an exhaustive probe of every channel.

use crate::domain::audio::{AudioDevice, DeviceCatalog, DeviceError, Result};
use crate::domain::curve;
use crate::domain::mixer::{Channel, ChannelId, ChannelType, VolumeInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// A directive to set matching channels to a percentage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSetRequest {
    /// Exact control name; `None` matches every control
    pub control_name: Option<String>,
    /// Channels to set; empty matches every channel
    pub channel_ids: Vec<ChannelId>,
    /// `None` matches both directions
    pub channel_type: Option<ChannelType>,
    pub target_percent: u8,
    /// Allowed verification error in percentage points
    pub max_error_percent: u8,
}

impl VolumeSetRequest {
    pub fn new(target_percent: u8) -> Self {
        Self {
            control_name: None,
            channel_ids: Vec::new(),
            channel_type: None,
            target_percent: target_percent.min(100),
            max_error_percent: 0,
        }
    }

    pub fn for_control(mut self, name: impl Into<String>) -> Self {
        self.control_name = Some(name.into());
        self
    }

    pub fn on_channels(mut self, ids: Vec<ChannelId>) -> Self {
        self.channel_ids = ids;
        self
    }

    pub fn of_type(mut self, channel_type: ChannelType) -> Self {
        self.channel_type = Some(channel_type);
        self
    }

    pub fn with_max_error(mut self, percent: u8) -> Self {
        self.max_error_percent = percent;
        self
    }

    /// One point for naming a control, one for naming channels
    pub fn specificity(&self) -> u8 {
        u8::from(self.control_name.is_some()) + u8::from(!self.channel_ids.is_empty())
    }

    pub fn matches(&self, control: &str, channel: &Channel) -> bool {
        if self.control_name.as_deref().is_some_and(|name| name != control) {
            return false;
        }
        if self.channel_type.is_some_and(|t| t != channel.channel_type) {
            return false;
        }
        self.channel_ids.is_empty() || self.channel_ids.contains(&channel.id)
    }
}

/// Identity of one channel across all devices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanKey {
    pub hw_id: String,
    pub control: String,
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
}

/// The request that won a channel, with the channel's state at plan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueVolumeSet {
    pub key: PlanKey,
    pub audio_device: AudioDevice,
    pub channel: Channel,
    pub request: VolumeSetRequest,
    pub specificity: u8,
    /// Filled in by [`verify`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_error: Option<u8>,
}

/// Deduplicated volume settings in first-insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumePlan {
    entries: Vec<UniqueVolumeSet>,
}

impl VolumePlan {
    pub fn entries(&self) -> &[UniqueVolumeSet] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &PlanKey) -> Option<&UniqueVolumeSet> {
        self.entries.iter().find(|e| &e.key == key)
    }
}

/// Collapse overlapping requests to one setting per channel.
///
/// A later request replaces an earlier one only when strictly more
/// specific, so among equally specific requests the first one wins.
#[instrument(skip_all, fields(devices = volumes.len(), requests = requests.len()))]
pub fn resolve_volume_plan(volumes: &[VolumeInfo], requests: &[VolumeSetRequest]) -> VolumePlan {
    let mut entries: Vec<UniqueVolumeSet> = Vec::new();
    let mut index: HashMap<PlanKey, usize> = HashMap::new();

    for volume in volumes {
        for request in requests {
            let specificity = request.specificity();
            for control in &volume.controls {
                for channel in &control.channels {
                    if !request.matches(&control.name, channel) {
                        continue;
                    }

                    let key = PlanKey {
                        hw_id: volume.audio_device.hw_id.clone(),
                        control: control.name.clone(),
                        channel_id: channel.id,
                        channel_type: channel.channel_type,
                    };
                    let entry = UniqueVolumeSet {
                        key: key.clone(),
                        audio_device: volume.audio_device.clone(),
                        channel: channel.clone(),
                        request: request.clone(),
                        specificity,
                        measured_error: None,
                    };

                    match index.get(&key) {
                        Some(&i) if specificity > entries[i].specificity => entries[i] = entry,
                        Some(_) => {}
                        None => {
                            index.insert(key, entries.len());
                            entries.push(entry);
                        }
                    }
                }
            }
        }
    }

    debug!(entries = entries.len(), "Resolved volume plan");
    VolumePlan { entries }
}

/// Result of applying one plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub key: PlanKey,
    pub target_percent: u8,
    pub raw_value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

/// Write every plan entry. A failed write is recorded and the rest proceed.
#[instrument(skip_all, fields(entries = plan.len()))]
pub fn apply(catalog: &dyn DeviceCatalog, plan: &VolumePlan) -> ApplyReport {
    let mut outcomes = Vec::with_capacity(plan.len());

    for entry in plan.entries() {
        let range = entry.channel.range;
        let raw_value = curve::to_raw(range.min, range.max, entry.request.target_percent);

        let error = catalog
            .write_channel_raw(
                &entry.audio_device,
                &entry.key.control,
                entry.key.channel_id,
                entry.key.channel_type,
                raw_value,
            )
            .err()
            .map(|e| {
                warn!(
                    device = %entry.key.hw_id,
                    control = %entry.key.control,
                    channel = %entry.key.channel_id,
                    error = %e,
                    "Failed to set volume"
                );
                e.to_string()
            });

        outcomes.push(ApplyOutcome {
            key: entry.key.clone(),
            target_percent: entry.request.target_percent,
            raw_value,
            error,
        });
    }

    let report = ApplyReport { outcomes };
    info!(
        applied = report.applied_count(),
        failed = report.outcomes.len() - report.applied_count(),
        "Applied volume plan"
    );
    report
}

/// Verification of one plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measurement {
    pub key: PlanKey,
    pub requested: u8,
    /// `None` when the channel could not be read back
    pub actual: Option<u8>,
    pub error: u8,
    pub error_percent: i32,
    pub max_error_percent: u8,
    pub within_tolerance: bool,
}

impl Measurement {
    fn new(key: PlanKey, requested: u8, actual: Option<u8>, max_error_percent: u8) -> Self {
        let Some(actual) = actual else {
            return Self {
                key,
                requested,
                actual: None,
                error: 0,
                error_percent: 0,
                max_error_percent,
                within_tolerance: false,
            };
        };

        let error = actual.abs_diff(requested);
        let error_percent = if requested == 0 {
            0
        } else {
            let diff = f64::from(actual) - f64::from(requested);
            (100.0 * diff / f64::from(requested)).round_ties_even() as i32
        };

        Self {
            key,
            requested,
            actual: Some(actual),
            error,
            error_percent,
            max_error_percent,
            within_tolerance: error <= max_error_percent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub measurements: Vec<Measurement>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.measurements.iter().all(|m| m.within_tolerance)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter().filter(|m| !m.within_tolerance)
    }

    pub fn into_result(self) -> Result<Self> {
        let count = self.failures().count();
        if count == 0 {
            Ok(self)
        } else {
            Err(DeviceError::ToleranceExceeded { count })
        }
    }
}

/// Read back every plan entry and compare against its target.
///
/// Readback uses the channel's linear raw percentage, the inverse of the
/// write direction, or its curve-aware percentage when the raw range is
/// degenerate. Each entry records its measured error.
#[instrument(skip_all, fields(entries = plan.len()))]
pub fn verify(catalog: &dyn DeviceCatalog, plan: &mut VolumePlan) -> VerifyReport {
    let mut snapshots: HashMap<String, Option<VolumeInfo>> = HashMap::new();
    let mut measurements = Vec::with_capacity(plan.len());

    for entry in &mut plan.entries {
        let snapshot = snapshots
            .entry(entry.key.hw_id.clone())
            .or_insert_with(|| match VolumeInfo::fetch(catalog, &entry.audio_device) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(device = %entry.key.hw_id, error = %e, "Could not re-read mixer");
                    None
                }
            });

        let actual = snapshot
            .as_ref()
            .and_then(|info| info.channel(&entry.key.control, entry.key.channel_id, entry.key.channel_type))
            .map(Channel::readback_percent);

        let measurement = Measurement::new(
            entry.key.clone(),
            entry.request.target_percent,
            actual,
            entry.request.max_error_percent,
        );
        entry.measured_error = actual.map(|_| measurement.error);

        if !measurement.within_tolerance {
            warn!(
                device = %entry.key.hw_id,
                control = %entry.key.control,
                channel = %entry.key.channel_id,
                requested = measurement.requested,
                actual = ?measurement.actual,
                "Volume outside tolerance"
            );
        }
        measurements.push(measurement);
    }

    let report = VerifyReport { measurements };
    info!(passed = report.passed(), "Verified volume plan");
    report
}

/// Re-read a single channel from the hardware
pub fn read_channel(
    catalog: &dyn DeviceCatalog,
    device: &AudioDevice,
    control: &str,
    id: ChannelId,
    channel_type: ChannelType,
) -> Result<Channel> {
    VolumeInfo::fetch(catalog, device)?
        .channel(control, id, channel_type)
        .cloned()
        .ok_or_else(|| {
            DeviceError::NotFound(format!(
                "{} channel {} of '{}' on {}",
                channel_type, id, control, device.hw_id
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeSample {
    pub requested: u8,
    /// Linear readback
    pub actual: u8,
    /// Curve-aware readback
    pub volume: u8,
}

/// Sweep of one channel across the whole percentage range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub key: PlanKey,
    pub samples: Vec<ProbeSample>,
    /// Set when the sweep stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub restored: bool,
}

impl ProbeResult {
    /// Number of distinct readback values, i.e. the channel's usable steps
    pub fn distinct_steps(&self) -> usize {
        let mut values: Vec<u8> = self.samples.iter().map(|s| s.actual).collect();
        values.dedup();
        values.len()
    }

    pub fn is_monotonic(&self) -> bool {
        self.samples.windows(2).all(|w| w[0].actual <= w[1].actual)
    }
}

fn sweep(
    catalog: &dyn DeviceCatalog,
    device: &AudioDevice,
    control: &str,
    channel: &Channel,
) -> (Vec<ProbeSample>, Option<String>) {
    let mut samples = Vec::with_capacity(101);

    for requested in 0..=100u8 {
        let raw = curve::to_raw(channel.range.min, channel.range.max, requested);
        let readback = catalog
            .write_channel_raw(device, control, channel.id, channel.channel_type, raw)
            .and_then(|_| read_channel(catalog, device, control, channel.id, channel.channel_type));

        match readback {
            Ok(read) => samples.push(ProbeSample {
                requested,
                actual: read.readback_percent(),
                volume: read.volume_percent,
            }),
            Err(e) => return (samples, Some(e.to_string())),
        }
    }

    (samples, None)
}

/// Sweep every channel of every device from 0 to 100 percent.
///
/// Each channel is restored to its pre-probe raw value afterwards.
#[instrument(skip_all, fields(devices = volumes.len()))]
pub fn probe(catalog: &dyn DeviceCatalog, volumes: &[VolumeInfo]) -> Vec<ProbeResult> {
    let mut results = Vec::new();

    for volume in volumes {
        let device = &volume.audio_device;
        for control in &volume.controls {
            for channel in &control.channels {
                let (samples, error) = sweep(catalog, device, &control.name, channel);

                let restored = match catalog.write_channel_raw(
                    device,
                    &control.name,
                    channel.id,
                    channel.channel_type,
                    channel.raw_value,
                ) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(device = %device.hw_id, control = %control.name, error = %e, "Could not restore volume");
                        false
                    }
                };

                let result = ProbeResult {
                    key: PlanKey {
                        hw_id: device.hw_id.clone(),
                        control: control.name.clone(),
                        channel_id: channel.id,
                        channel_type: channel.channel_type,
                    },
                    samples,
                    error,
                    restored,
                };
                debug!(
                    device = %device.hw_id,
                    control = %control.name,
                    channel = %channel.id,
                    steps = result.distinct_steps(),
                    "Probed channel"
                );
                results.push(result);
            }
        }
    }

    info!(channels = results.len(), "Probe complete");
    results
}
