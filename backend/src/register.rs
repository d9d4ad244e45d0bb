use common::req::{RegisterRequest, REGISTER_FIRMWARE};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::NewDevice;
use crate::firmware::FirmwareRepository;
use crate::header::SensorHeader;
use crate::store::DeviceStore;

/// Registers a device on first contact and returns the firmware it should run.
///
/// An already known serial number is left untouched. Storage failures are logged and
/// the device still gets its firmware target.
pub fn register<S: DeviceStore + ?Sized>(
    store: &mut S,
    firmware: &FirmwareRepository,
    header: &SensorHeader,
    body: &Value,
) -> i64 {
    let next_firmware = firmware.latest_version().unwrap_or_else(|| {
        warn!("No firmware release in {}", firmware.dir().display());
        REGISTER_FIRMWARE
    });
    info!("Next firmware: {next_firmware}");

    let devs = match store.devices_by_serial(header.serial_number) {
        Ok(devs) => devs,
        Err(err) => {
            error!("Cannot look up device {}: {err}", header.serial_number);
            return next_firmware;
        }
    };

    if !devs.is_empty() {
        warn!(
            "There is already {} device registered for {}",
            devs.len(),
            header.serial_number
        );
        return next_firmware;
    }

    let request = match RegisterRequest::deserialize(body) {
        Ok(request) => request,
        Err(err) => {
            error!("Bad registration from {}: {err}", header.serial_number);
            return next_firmware;
        }
    };

    let dev = NewDevice {
        serial_number: header.serial_number,
        acq_period: header.acq_period,
        screen_mode: 0,
        last_calibration: header.last_calibration,
        firmware_version: next_firmware,
        hardware_info: request.user_record.hardware_info.to_string(),
    };
    match store.insert_device(&dev) {
        Ok(()) => info!("Registered device {}", header.serial_number),
        Err(err) => error!("Cannot register device {}: {err}", header.serial_number),
    }

    next_firmware
}
