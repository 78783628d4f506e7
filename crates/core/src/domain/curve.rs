//! Volume curve translation between hardware units and percentages
//!
//! Reads map through the decibel range when the hardware reports one: ranges
//! up to 24 dB are mapped linearly, wider ranges through a logarithmic curve
//! anchored at the maximum. Writes are always linear over the raw range, so a
//! write followed by a read is not an identity for wide dB ranges.

use crate::domain::audio::{DeviceError, Result};

/// Widest dB range (in 1/100 dB) still mapped linearly
pub const MAX_LINEAR_DB_SCALE: i64 = 24 * 100;

/// ALSA's "muted" dB floor
pub const DB_GAIN_MUTE: i64 = -9_999_999;

/// Raw hardware reading of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReading {
    pub min: i64,
    pub max: i64,
    pub value: i64,
}

/// Decibel reading of one channel, in 1/100 dB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbReading {
    pub min: i64,
    pub max: i64,
    pub value: i64,
}

pub fn is_linear_db_scale(min_db: i64, max_db: i64) -> bool {
    max_db - min_db <= MAX_LINEAR_DB_SCALE
}

/// Convert a hardware reading to a percentage in `[0, 100]`.
///
/// A missing or inverted dB range falls back to the raw range. Only a
/// degenerate raw range (`min == max`) is an error.
pub fn to_percent(raw: RawReading, db: Option<DbReading>) -> Result<u8> {
    if let Some(db) = db.filter(|db| db.min < db.max) {
        return Ok(db_to_percent(db));
    }

    if raw.min == raw.max {
        return Err(DeviceError::InvalidRange {
            min: raw.min,
            max: raw.max,
        });
    }

    let percent = (raw.value - raw.min) as f64 * 100.0 / (raw.max - raw.min) as f64;
    Ok(clamp_percent(percent))
}

fn db_to_percent(db: DbReading) -> u8 {
    if is_linear_db_scale(db.min, db.max) {
        let percent = (db.value - db.min) as f64 * 100.0 / (db.max - db.min) as f64;
        return clamp_percent(percent);
    }

    let mut normalized = 10f64.powf((db.value - db.max) as f64 / 6000.0);
    if db.min != DB_GAIN_MUTE {
        let min_norm = 10f64.powf((db.min - db.max) as f64 / 6000.0);
        normalized = (normalized - min_norm) / (1.0 - min_norm);
    }
    clamp_percent(normalized * 100.0)
}

/// Convert a percentage to a raw value. Always linear.
pub fn to_raw(min_raw: i64, max_raw: i64, percent: u8) -> i64 {
    let percent = percent.min(100) as f64;
    let value = min_raw as f64 + percent * (max_raw - min_raw) as f64 / 100.0;
    value.round_ties_even() as i64
}

fn clamp_percent(percent: f64) -> u8 {
    percent.round_ties_even().clamp(0.0, 100.0) as u8
}
