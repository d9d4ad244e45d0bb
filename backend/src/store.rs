use thiserror::Error;

use crate::db::models::{Device, DeviceInfoUpdate, NewDevice, NewRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Persistence the reconciliation protocol needs.
///
/// Every method is one atomic commit: a successful return is visible to the next
/// lookup of the same device.
pub trait DeviceStore {
    /// All rows for a serial number, oldest first. More than one row is a corruption
    /// the store does not prevent.
    fn devices_by_serial(&mut self, serial_number: i64) -> Result<Vec<Device>, StoreError>;

    fn insert_device(&mut self, device: &NewDevice) -> Result<(), StoreError>;

    /// Appends a record and moves the device's `last_seen`/`last_co2` to it.
    fn insert_record(&mut self, device_id: i32, record: &NewRecord) -> Result<(), StoreError>;

    fn update_calibration(&mut self, device_id: i32, last_calibration: i64) -> Result<(), StoreError>;

    fn update_device_info(&mut self, device_id: i32, info: &DeviceInfoUpdate) -> Result<(), StoreError>;
}
