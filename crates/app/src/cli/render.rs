//! Human-readable and JSON output

use rigfinder_core::domain::filter::Matched;
use rigfinder_core::domain::search::{AudioMatch, SearchResult};
use rigfinder_core::domain::topology::DeviceDescription;
use rigfinder_core::domain::volume::{ApplyReport, ProbeResult, VerifyReport, VolumePlan};
use rigfinder_core::domain::SerialPort;
use serde::Serialize;
use std::fmt::{self, Write};

/// Everything a run produced
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub result: SearchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<VolumePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<Vec<ProbeResult>>,
}

pub fn to_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn push_description(out: &mut String, desc: Option<&DeviceDescription>) -> fmt::Result {
    let Some(desc) = desc else {
        return writeln!(out, "        topology: unavailable");
    };
    writeln!(out, "        bus: {}, device: {}", desc.bus_number, desc.device_number)?;
    writeln!(out, "        topology depth: {}", desc.topology_depth)?;
    writeln!(out, "        vendor: {}, product id: {}", desc.id_vendor, desc.id_product)?;
    if !desc.product.is_empty() {
        writeln!(out, "        product: {}", desc.product)?;
    }
    if !desc.manufacturer.is_empty() {
        writeln!(out, "        manufacturer: {}", desc.manufacturer)?;
    }
    writeln!(out, "        path: {}", desc.path)?;
    writeln!(out, "        hw path: {}", desc.hw_path)
}

fn push_audio(out: &mut String, index: usize, m: &AudioMatch, list_properties: bool) -> fmt::Result {
    let d = &m.device;
    writeln!(
        out,
        "{:>3}  {:<10} {} ({})",
        index + 1,
        d.hw_id,
        d.name,
        d.description
    )?;
    if !list_properties {
        return Ok(());
    }

    writeln!(out, "        plughw id: {}", d.plughw_id)?;
    writeln!(out, "        stream name: {}", d.stream_name)?;
    writeln!(out, "        type: {}", d.device_type)?;
    push_description(out, m.description.as_ref())?;
    for control in &m.volume.controls {
        writeln!(out, "        control: {}", control.name)?;
        for channel in &control.channels {
            writeln!(
                out,
                "            {} {}: {}% (raw {} in {}..{})",
                channel.channel_type,
                channel.name,
                channel.volume_percent,
                channel.raw_value,
                channel.range.min,
                channel.range.max
            )?;
        }
    }
    Ok(())
}

fn push_port(out: &mut String, index: usize, m: &Matched<SerialPort>, list_properties: bool) -> fmt::Result {
    let p = &m.item;
    writeln!(out, "{:>3}  {:<14} {}", index + 1, p.name, p.description)?;
    if !list_properties {
        return Ok(());
    }

    writeln!(out, "        manufacturer: {}", p.manufacturer)?;
    writeln!(out, "        serial number: {}", p.device_serial_number)?;
    push_description(out, m.description.as_ref())
}

pub fn to_text(report: &RunReport, list_properties: bool) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let result = &report.result;

    if !result.audio_devices.is_empty() {
        writeln!(out, "Found audio devices:\n")?;
        for (i, m) in result.audio_devices.iter().enumerate() {
            push_audio(&mut out, i, m, list_properties)?;
        }
        out.push('\n');
    }

    if !result.serial_ports.is_empty() {
        writeln!(out, "Found serial ports:\n")?;
        for (i, m) in result.serial_ports.iter().enumerate() {
            push_port(&mut out, i, m, list_properties)?;
        }
        out.push('\n');
    }

    if result.is_empty() {
        writeln!(out, "No matching devices found.")?;
    }

    if let Some(apply) = &report.apply {
        for failure in apply.failures() {
            writeln!(
                out,
                "Failed to set {} '{}' {} {}: {}",
                failure.key.hw_id,
                failure.key.control,
                failure.key.channel_type,
                failure.key.channel_id,
                failure.error.as_deref().unwrap_or_default()
            )?;
        }
    }

    if let Some(verify) = &report.verify {
        writeln!(
            out,
            "Volume verification {}",
            if verify.passed() { "passed" } else { "FAILED" }
        )?;
        for m in verify.failures() {
            let actual = m
                .actual
                .map(|a| format!("{}%", a))
                .unwrap_or_else(|| "unreadable".to_string());
            writeln!(
                out,
                "    {} '{}' {} {}: requested {}%, got {} (error {}, allowed {})",
                m.key.hw_id,
                m.key.control,
                m.key.channel_type,
                m.key.channel_id,
                m.requested,
                actual,
                m.error,
                m.max_error_percent
            )?;
        }
    }

    if let Some(probe) = &report.probe {
        writeln!(out, "Probe results:")?;
        for p in probe {
            writeln!(
                out,
                "    {} '{}' {} {}: {} steps{}{}",
                p.key.hw_id,
                p.key.control,
                p.key.channel_type,
                p.key.channel_id,
                p.distinct_steps(),
                if p.is_monotonic() { "" } else { ", non-monotonic" },
                p.error.as_ref().map(|e| format!(", stopped: {}", e)).unwrap_or_default()
            )?;
        }
    }

    Ok(out)
}
