use std::collections::{BTreeMap, BTreeSet};

use crate::calibration::{self, CalibrationAge};
use crate::config::Thresholds;
use crate::db::models::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Danger,
    Offline,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Ok, Status::Warning, Status::Danger, Status::Offline];

    pub fn color(&self) -> &'static str {
        match self {
            Status::Ok => "#92e0d3",
            Status::Warning => "#f4d44d",
            Status::Danger => "#f45060",
            Status::Offline => "#666",
        }
    }
}

/// Air-quality status of a device from its latest reading.
pub fn classify(co2: Option<i64>, last_seen: Option<i64>, now: i64, offline_after: i64, thresholds: &Thresholds) -> Status {
    if let Some(ts) = last_seen {
        if now.saturating_sub(ts) > offline_after {
            return Status::Offline;
        }
    }

    match co2 {
        None => Status::Offline,
        Some(v) if v > thresholds.danger => Status::Danger,
        Some(v) if v > thresholds.warning => Status::Warning,
        Some(_) => Status::Ok,
    }
}

/// Serial numbers per status, every status present.
pub fn by_status(devices: &[Device], now: i64, offline_after: i64, thresholds: &Thresholds) -> BTreeMap<Status, BTreeSet<i64>> {
    let mut out: BTreeMap<Status, BTreeSet<i64>> = Status::ALL.into_iter().map(|s| (s, BTreeSet::new())).collect();
    for dev in devices {
        let status = classify(dev.last_co2, dev.last_seen, now, offline_after, thresholds);
        out.entry(status).or_default().insert(dev.serial_number);
    }
    out
}

#[derive(Debug, Default, serde::Serialize)]
pub struct Summary {
    pub by_status: BTreeMap<Status, BTreeSet<i64>>,
    pub by_firmware_version: BTreeMap<i64, BTreeSet<i64>>,
    pub by_building: BTreeMap<String, BTreeSet<i64>>,
    pub by_last_calibration: BTreeMap<CalibrationAge, BTreeSet<i64>>,
    pub total: usize,
}

pub fn summarize(devices: &[Device], now: i64, offline_after: i64, thresholds: &Thresholds) -> Summary {
    let mut summary = Summary::default();

    for dev in devices {
        let status = classify(dev.last_co2, dev.last_seen, now, offline_after, thresholds);
        summary.by_status.entry(status).or_default().insert(dev.serial_number);
        summary
            .by_firmware_version
            .entry(dev.firmware_version)
            .or_default()
            .insert(dev.serial_number);
        summary
            .by_building
            .entry(dev.building.clone())
            .or_default()
            .insert(dev.serial_number);
        summary
            .by_last_calibration
            .entry(calibration::age(dev.last_calibration, now))
            .or_default()
            .insert(dev.serial_number);
        summary.total += 1;
    }

    summary
}

/// CO2 series of one device, oldest first.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Co2Series {
    pub serial_number: i64,
    pub timestamps: Vec<i64>,
    pub values: Vec<i64>,
}

impl Co2Series {
    /// Builds the series from `(timestamp, co2)` rows sorted newest first.
    pub fn from_newest_first(serial_number: i64, rows: Vec<(i64, i64)>) -> Self {
        let (timestamps, values) = rows.into_iter().rev().unzip();
        Self {
            serial_number,
            timestamps,
            values,
        }
    }
}

/// A negative `min_ts` counts back from `now`.
pub fn window_start(min_ts: i64, now: i64) -> i64 {
    if min_ts < 0 {
        now.saturating_add(min_ts)
    } else {
        min_ts
    }
}
