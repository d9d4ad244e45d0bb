// keep in sync with the sensor firmware
use serde::{Deserialize, Serialize};

// ===============================================
// headers
// ===============================================
pub mod header {
    pub const API_KEY: &str = "SNO-API-KEY";
    pub const SERIAL_NUMBER: &str = "SNO-SERIAL-NUMBER";
    pub const ACQ_PERIOD: &str = "SNO-ACQ-PERIOD";
    pub const METHOD: &str = "SNO-METHOD";
    pub const LAST_CALIBRATION: &str = "SNO-USER-lastCalibration";
    pub const FIRMWARE_VERSION: &str = "SNO-USER-firmwareVersion";
    pub const SCREEN_MODE: &str = "SNO-USER-screenMode";
}

/// Calibration value of a device that was never calibrated.
pub const NO_CAL: i64 = 42;

/// Firmware a device installs before anything else (`first.ino.bin`).
pub const REGISTER_FIRMWARE: i64 = 1;

/// Alias a device uses to ask for the newest firmware.
pub const LATEST_FIRMWARE: i64 = 10;

pub const DEFAULT_ACQ_PERIOD: i64 = 5000; // ms

pub const METHOD_MEASUREMENT: i64 = 0;
pub const METHOD_DEVICE_INFO: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i64)]
pub enum ScreenMode {
    Full = 0,
    Minimal = 1,
    Off = 2,
}

impl TryFrom<i64> for ScreenMode {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::Minimal),
            2 => Ok(Self::Off),
            other => Err(other),
        }
    }
}

// ===============================================
// device -> server
// ===============================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "userRecord")]
    pub user_record: RegisterUserRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRecord {
    #[serde(rename = "hardwareInfo")]
    pub hardware_info: serde_json::Value,
}

/// Body of a `/store` call with method 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub timestamp: i64, // s
    pub uptime: i64,
    #[serde(rename = "ntpEpoch")]
    pub ntp_epoch: i64,
    #[serde(rename = "bootID")]
    pub boot_id: i64,
    #[serde(rename = "userRecord")]
    pub user_record: MeasurementUserRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementUserRecord {
    pub co2: i64,         // ppm
    pub temperature: i64, // °C
}

// ===============================================
// server -> device
// ===============================================

/// Settings the device must overwrite with the server's values.
///
/// Every key is optional and only present when the device disagrees with the
/// server, so an in-sync device receives `{}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPayload {
    #[serde(rename = "acqPeriod", skip_serializing_if = "Option::is_none")]
    pub acq_period: Option<i64>,
    #[serde(rename = "userServerPayload", skip_serializing_if = "Option::is_none")]
    pub user_server_payload: Option<UserServerPayload>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserServerPayload {
    #[serde(rename = "screenMode", skip_serializing_if = "Option::is_none")]
    pub screen_mode: Option<i64>,
    #[serde(rename = "lastCalibration", skip_serializing_if = "Option::is_none")]
    pub last_calibration: Option<i64>,
    #[serde(rename = "firmwareVersion", skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<i64>,
}

impl UserServerPayload {
    pub fn is_empty(&self) -> bool {
        self.screen_mode.is_none() && self.last_calibration.is_none() && self.firmware_version.is_none()
    }
}

impl ServerPayload {
    /// Tells the device which firmware to install.
    pub fn with_firmware(firmware_version: i64) -> Self {
        Self {
            acq_period: None,
            user_server_payload: Some(UserServerPayload {
                firmware_version: Some(firmware_version),
                ..Default::default()
            }),
        }
    }

    /// Sends an unknown device back to registration.
    pub fn reregister() -> Self {
        Self::with_firmware(REGISTER_FIRMWARE)
    }

    /// Nests the user payload, dropping it when there is nothing to send.
    pub fn set_user_payload(&mut self, user: UserServerPayload) {
        self.user_server_payload = if user.is_empty() { None } else { Some(user) };
    }

    pub fn is_empty(&self) -> bool {
        self.acq_period.is_none() && self.user_server_payload.is_none()
    }
}
