use actix_web::http::header::HeaderMap;
use common::req::{header, DEFAULT_ACQ_PERIOD, METHOD_MEASUREMENT, NO_CAL, REGISTER_FIRMWARE};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("missing or malformed {} header", header::SERIAL_NUMBER)]
    MissingIdentity,
}

/// The `SNO-*` headers every device request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorHeader {
    pub serial_number: i64,
    pub acq_period: i64, // ms
    pub method: i64,
    pub last_calibration: i64,
    pub firmware_version: i64,
    pub screen_mode: i64,
}

fn int_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

impl SensorHeader {
    /// Only the serial number is mandatory; anything else missing or malformed
    /// falls back to its default.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HeaderError> {
        let serial_number = int_header(headers, header::SERIAL_NUMBER).ok_or(HeaderError::MissingIdentity)?;

        Ok(Self {
            serial_number,
            acq_period: int_header(headers, header::ACQ_PERIOD).unwrap_or(DEFAULT_ACQ_PERIOD),
            method: int_header(headers, header::METHOD).unwrap_or(METHOD_MEASUREMENT),
            last_calibration: int_header(headers, header::LAST_CALIBRATION).unwrap_or(NO_CAL),
            firmware_version: int_header(headers, header::FIRMWARE_VERSION).unwrap_or(REGISTER_FIRMWARE),
            screen_mode: int_header(headers, header::SCREEN_MODE).unwrap_or(0),
        })
    }
}
