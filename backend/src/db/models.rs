use common::req::MeasurementReport;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, PartialEq, Queryable, serde::Serialize)]
pub struct Device {
    pub id: i32,
    pub serial_number: i64,
    pub acq_period: i64, // ms
    pub screen_mode: i64,
    pub last_calibration: i64,
    pub firmware_version: i64,
    pub hardware_info: String, // json
    pub reference_device: i32,
    pub building: String,
    pub floor: String,
    pub room: String,
    pub last_seen: Option<i64>, // s
    pub last_co2: Option<i64>,  // ppm
}

#[derive(Debug, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDevice {
    pub serial_number: i64,
    pub acq_period: i64,
    pub screen_mode: i64,
    pub last_calibration: i64,
    pub firmware_version: i64,
    pub hardware_info: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, serde::Serialize)]
pub struct Record {
    pub id: i32,
    pub serial_number: i64,
    pub timestamp: i64, // s
    pub co2: i64,       // ppm
    pub temperature: i64,
    pub uptime: i64,
    pub ntp_epoch: i64,
    pub boot_id: i64,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = records)]
pub struct NewRecord {
    pub serial_number: i64,
    pub timestamp: i64,
    pub co2: i64,
    pub temperature: i64,
    pub uptime: i64,
    pub ntp_epoch: i64,
    pub boot_id: i64,
}

impl NewRecord {
    pub fn from_report(serial_number: i64, report: &MeasurementReport) -> Self {
        Self {
            serial_number,
            timestamp: report.timestamp,
            co2: report.user_record.co2,
            temperature: report.user_record.temperature,
            uptime: report.uptime,
            ntp_epoch: report.ntp_epoch,
            boot_id: report.boot_id,
        }
    }
}

/// What a device reports about itself with method 1.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = devices)]
pub struct DeviceInfoUpdate {
    pub firmware_version: i64,
    pub last_calibration: i64,
    pub hardware_info: String,
}

#[derive(Debug, Default, Clone, PartialEq, AsChangeset, serde::Deserialize)]
#[diesel(table_name = devices)]
pub struct LocationUpdate {
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room: Option<String>,
    pub reference_device: Option<i32>,
}

impl LocationUpdate {
    pub fn is_empty(&self) -> bool {
        self.building.is_none() && self.floor.is_none() && self.room.is_none() && self.reference_device.is_none()
    }
}
