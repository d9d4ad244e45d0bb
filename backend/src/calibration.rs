//! Calibration values carry two things in one decimal integer: a calibration date
//! (a Unix timestamp in seconds) and, in its last digit, a check digit the server
//! flips to ask for a recalibration.
//!
//! A request goes round like this:
//! 1. the server changes the check digit of its stored value,
//! 2. the device sees a value that differs only in that digit and recalibrates,
//! 3. the device reports its new date with the server's check digit,
//! 4. the server sees a new date and adopts the device's value.

use common::req::NO_CAL;

const DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStamp {
    pub date: i64,
    pub check: u8,
}

impl CalibrationStamp {
    pub fn split(value: i64) -> Self {
        let magnitude = value.unsigned_abs();
        let check = (magnitude % 10) as u8;
        let rest = (magnitude / 10) as i64;
        // negative values keep their sign in the date half
        let date = if value < 0 { -rest - 1 } else { rest };
        Self { date, check }
    }
}

/// How a device's reported calibration relates to the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationDrift {
    InSync,
    /// The device calibrated since the server last heard from it.
    Recalibrated,
    /// The server flipped the check digit and waits for the device to recalibrate.
    Requested,
}

pub fn drift(reported: i64, stored: i64) -> CalibrationDrift {
    let reported = CalibrationStamp::split(reported);
    let stored = CalibrationStamp::split(stored);

    if reported.date != stored.date {
        CalibrationDrift::Recalibrated
    } else if reported.check != stored.check {
        CalibrationDrift::Requested
    } else {
        CalibrationDrift::InSync
    }
}

/// Next value of a stored calibration after an admin asked for a recalibration.
pub fn toggle_check(value: i64) -> i64 {
    if CalibrationStamp::split(value).check == 9 {
        value.saturating_sub(9)
    } else {
        // at i64::MAX step down instead, the digit still changes
        value.checked_add(1).unwrap_or(value - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum CalibrationAge {
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "longer")]
    Longer,
    #[serde(rename = "N/A")]
    Never,
}

pub fn age(value: i64, now: i64) -> CalibrationAge {
    if value == NO_CAL {
        return CalibrationAge::Never;
    }

    let ranges = [
        (CalibrationAge::Day, DAY),
        (CalibrationAge::Week, 7 * DAY),
        (CalibrationAge::Month, 30 * DAY),
        (CalibrationAge::Year, 365 * DAY),
    ];
    ranges
        .into_iter()
        .find(|(_, delta)| value > now - delta)
        .map(|(age, _)| age)
        .unwrap_or(CalibrationAge::Longer)
}
