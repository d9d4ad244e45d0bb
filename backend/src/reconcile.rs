//! Server side of the `/store` handshake.
//!
//! The server owns the device configuration. Every poll compares what the device
//! reports in its headers with the stored device and answers with the values the
//! device has to adopt. Nothing is acknowledged: a device keeps receiving the same
//! instruction until the headers of a later poll match.

use common::req::{MeasurementReport, ServerPayload, UserServerPayload, METHOD_DEVICE_INFO, METHOD_MEASUREMENT};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::calibration::{self, CalibrationDrift};
use crate::db::models::{Device, DeviceInfoUpdate, NewRecord};
use crate::header::SensorHeader;
use crate::store::DeviceStore;

/// Handles one `/store` call and returns what the device must change.
pub fn store<S: DeviceStore + ?Sized>(store: &mut S, header: &SensorHeader, body: Option<&Value>) -> ServerPayload {
    let devs = match store.devices_by_serial(header.serial_number) {
        Ok(devs) => devs,
        Err(err) => {
            error!("Cannot look up device {}: {err}", header.serial_number);
            return ServerPayload::default();
        }
    };

    let count = devs.len();
    let Some(mut dev) = devs.into_iter().next() else {
        warn!("No device found for {}", header.serial_number);
        return ServerPayload::reregister();
    };

    if count > 1 {
        error!(
            "Store corrupted: {count} devices found for {}, using id {}",
            header.serial_number, dev.id
        );
    }

    match header.method {
        METHOD_MEASUREMENT => record_measurement(store, header, body, &mut dev),
        METHOD_DEVICE_INFO => record_device_info(store, header, body, &mut dev),
        other => {
            error!("Unknown method: {other}");
            return ServerPayload::default();
        }
    }

    diff(store, header, &mut dev)
}

fn record_measurement<S: DeviceStore + ?Sized>(store: &mut S, header: &SensorHeader, body: Option<&Value>, dev: &mut Device) {
    let report = match body.map(|b| MeasurementReport::deserialize(b)) {
        Some(Ok(report)) => report,
        Some(Err(err)) => {
            error!("Bad measurement from {}: {err}", header.serial_number);
            return;
        }
        None => {
            error!("Measurement from {} without body", header.serial_number);
            return;
        }
    };

    let record = NewRecord::from_report(header.serial_number, &report);
    dev.last_seen = Some(record.timestamp);
    dev.last_co2 = Some(record.co2);

    if let Err(err) = store.insert_record(dev.id, &record) {
        error!("Cannot store measurement from {}: {err}", header.serial_number);
    }
}

/// The device pushes its running configuration and the server takes it as is.
///
/// Firmware and calibration are overwritten before the diff, so a method 1 poll
/// never carries `firmwareVersion` or `lastCalibration` back.
fn record_device_info<S: DeviceStore + ?Sized>(store: &mut S, header: &SensorHeader, body: Option<&Value>, dev: &mut Device) {
    let info = DeviceInfoUpdate {
        firmware_version: header.firmware_version,
        last_calibration: header.last_calibration,
        hardware_info: body.unwrap_or(&Value::Null).to_string(),
    };
    dev.firmware_version = info.firmware_version;
    dev.last_calibration = info.last_calibration;
    dev.hardware_info = info.hardware_info.clone();

    if let Err(err) = store.update_device_info(dev.id, &info) {
        error!("Cannot store device info from {}: {err}", header.serial_number);
    }
}

/// Compares the reported headers against the stored device.
///
/// A new calibration date is the only field where the device wins: the server
/// adopts it right away and sends nothing back for it.
pub fn diff<S: DeviceStore + ?Sized>(store: &mut S, header: &SensorHeader, dev: &mut Device) -> ServerPayload {
    let mut payload = ServerPayload::default();
    let mut user = UserServerPayload::default();

    if header.acq_period != dev.acq_period {
        payload.acq_period = Some(dev.acq_period);
    }

    if header.screen_mode != dev.screen_mode {
        user.screen_mode = Some(dev.screen_mode);
    }

    match calibration::drift(header.last_calibration, dev.last_calibration) {
        CalibrationDrift::InSync => {}
        CalibrationDrift::Recalibrated => {
            info!(
                "Device {} recalibrated: {} -> {}",
                header.serial_number, dev.last_calibration, header.last_calibration
            );
            dev.last_calibration = header.last_calibration;
            if let Err(err) = store.update_calibration(dev.id, dev.last_calibration) {
                error!("Cannot store calibration of {}: {err}", header.serial_number);
            }
        }
        CalibrationDrift::Requested => {
            user.last_calibration = Some(dev.last_calibration);
        }
    }

    if header.firmware_version != dev.firmware_version {
        user.firmware_version = Some(dev.firmware_version);
    }

    payload.set_user_payload(user);
    payload
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::NewDevice;
    use crate::db::tests::new_device;
    use crate::db::Db;
    use crate::store::StoreError;
    use common::req::NO_CAL;
    use serde_json::json;

    /// Answers lookups with fixed devices and fails every write.
    pub struct ReadOnlyStore {
        pub devices: Vec<Device>,
        pub writes: usize,
    }

    impl DeviceStore for ReadOnlyStore {
        fn devices_by_serial(&mut self, serial_number: i64) -> Result<Vec<Device>, StoreError> {
            Ok(self.devices.iter().filter(|d| d.serial_number == serial_number).cloned().collect())
        }

        fn insert_device(&mut self, _device: &NewDevice) -> Result<(), StoreError> {
            self.writes += 1;
            Err(diesel::result::Error::RollbackTransaction.into())
        }

        fn insert_record(&mut self, _device_id: i32, _record: &NewRecord) -> Result<(), StoreError> {
            self.writes += 1;
            Err(diesel::result::Error::RollbackTransaction.into())
        }

        fn update_calibration(&mut self, _device_id: i32, _last_calibration: i64) -> Result<(), StoreError> {
            self.writes += 1;
            Err(diesel::result::Error::RollbackTransaction.into())
        }

        fn update_device_info(&mut self, _device_id: i32, _info: &DeviceInfoUpdate) -> Result<(), StoreError> {
            self.writes += 1;
            Err(diesel::result::Error::RollbackTransaction.into())
        }
    }

    const SERIAL: i64 = 1234;
    const CAL: i64 = 16263000001;
    const FW: i64 = 2021071801;

    fn synced_header() -> SensorHeader {
        SensorHeader {
            serial_number: SERIAL,
            acq_period: 5000,
            method: METHOD_MEASUREMENT,
            last_calibration: CAL,
            firmware_version: FW,
            screen_mode: 0,
        }
    }

    fn setup() -> Db {
        let mut db = Db::in_memory();
        db.insert_device(&NewDevice {
            last_calibration: CAL,
            firmware_version: FW,
            ..new_device(SERIAL)
        })
        .unwrap();
        db
    }

    fn measurement(timestamp: i64, co2: i64) -> Value {
        json!({
            "timestamp": timestamp,
            "uptime": 120,
            "ntpEpoch": timestamp - 120,
            "bootID": 3,
            "userRecord": {"co2": co2, "temperature": 24}
        })
    }

    fn stored(db: &mut Db) -> Device {
        db.devices_by_serial(SERIAL).unwrap().remove(0)
    }

    fn to_json(payload: &ServerPayload) -> Value {
        serde_json::to_value(payload).unwrap()
    }

    #[test]
    fn synced_device_gets_empty_payload() {
        let mut db = setup();
        let payload = store(&mut db, &synced_header(), Some(&measurement(1000, 600)));
        assert_eq!(to_json(&payload), json!({}));
    }

    #[test]
    fn each_field_lands_in_its_place() {
        let mut db = setup();
        let body = measurement(1000, 600);

        let header = SensorHeader { acq_period: 60000, ..synced_header() };
        assert_eq!(to_json(&store(&mut db, &header, Some(&body))), json!({"acqPeriod": 5000}));

        let header = SensorHeader { screen_mode: 2, ..synced_header() };
        assert_eq!(
            to_json(&store(&mut db, &header, Some(&body))),
            json!({"userServerPayload": {"screenMode": 0}})
        );

        let header = SensorHeader { firmware_version: 2020010101, ..synced_header() };
        assert_eq!(
            to_json(&store(&mut db, &header, Some(&body))),
            json!({"userServerPayload": {"firmwareVersion": FW}})
        );

        let header = SensorHeader { last_calibration: CAL + 1, ..synced_header() };
        assert_eq!(
            to_json(&store(&mut db, &header, Some(&body))),
            json!({"userServerPayload": {"lastCalibration": CAL}})
        );
    }

    #[test]
    fn measurement_is_recorded() {
        let mut db = setup();
        store(&mut db, &synced_header(), Some(&measurement(1626300000, 812)));

        let records = db.records(SERIAL).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].co2, 812);
        assert_eq!(records[0].temperature, 24);
        assert_eq!(records[0].timestamp, 1626300000);

        let dev = stored(&mut db);
        assert_eq!(dev.last_seen, Some(1626300000));
        assert_eq!(dev.last_co2, Some(812));
    }

    #[test]
    fn malformed_measurement_still_reconciles() {
        let mut db = setup();
        let header = SensorHeader { acq_period: 60000, ..synced_header() };

        let payload = store(&mut db, &header, Some(&json!({"timestamp": 1000})));
        assert_eq!(to_json(&payload), json!({"acqPeriod": 5000}));

        let payload = store(&mut db, &header, None);
        assert_eq!(to_json(&payload), json!({"acqPeriod": 5000}));
        assert!(db.records(SERIAL).unwrap().is_empty());
    }

    #[test]
    fn unknown_device_is_sent_to_registration() {
        let mut db = setup();
        let header = SensorHeader { serial_number: 99, ..synced_header() };

        let payload = store(&mut db, &header, Some(&measurement(1000, 600)));
        assert_eq!(to_json(&payload), json!({"userServerPayload": {"firmwareVersion": 1}}));
        assert!(db.records(99).unwrap().is_empty());
    }

    #[test]
    fn unknown_method_is_ignored() {
        let mut db = setup();
        let header = SensorHeader { method: 7, acq_period: 60000, ..synced_header() };

        let payload = store(&mut db, &header, Some(&measurement(1000, 600)));
        assert!(payload.is_empty());
        assert!(db.records(SERIAL).unwrap().is_empty());
    }

    #[test]
    fn pending_recalibration_repeats_until_device_reports_new_date() {
        let mut db = setup();
        let id = stored(&mut db).id;
        db.request_recalibration(&[id]).unwrap();
        let requested = stored(&mut db).last_calibration;
        assert_eq!(requested, CAL + 1);

        for _ in 0..3 {
            let payload = store(&mut db, &synced_header(), Some(&measurement(1000, 600)));
            assert_eq!(to_json(&payload), json!({"userServerPayload": {"lastCalibration": requested}}));
        }

        // the device recalibrated and replays the requested check digit
        let fresh = 16299990002;
        let header = SensorHeader { last_calibration: fresh, ..synced_header() };
        assert!(store(&mut db, &header, Some(&measurement(2000, 600))).is_empty());
        assert_eq!(stored(&mut db).last_calibration, fresh);
        assert!(store(&mut db, &header, Some(&measurement(3000, 600))).is_empty());
    }

    #[test]
    fn never_calibrated_device_adopts_first_calibration() {
        let mut db = Db::in_memory();
        db.insert_device(&NewDevice {
            last_calibration: NO_CAL,
            firmware_version: FW,
            ..new_device(SERIAL)
        })
        .unwrap();

        assert!(store(&mut db, &synced_header(), Some(&measurement(1000, 600))).is_empty());
        assert_eq!(stored(&mut db).last_calibration, CAL);
    }

    #[test]
    fn device_info_is_adopted_without_firmware_or_calibration_diff() {
        let mut db = setup();
        let header = SensorHeader {
            method: METHOD_DEVICE_INFO,
            firmware_version: 2022010101,
            last_calibration: CAL + 1,
            screen_mode: 1,
            ..synced_header()
        };
        let info = json!({"chip": "esp8266", "flash": 4194304});

        let payload = store(&mut db, &header, Some(&info));
        assert_eq!(to_json(&payload), json!({"userServerPayload": {"screenMode": 0}}));

        let dev = stored(&mut db);
        assert_eq!(dev.firmware_version, 2022010101);
        assert_eq!(dev.last_calibration, CAL + 1);
        assert_eq!(serde_json::from_str::<Value>(&dev.hardware_info).unwrap(), info);
        assert!(db.records(SERIAL).unwrap().is_empty());
    }

    #[test]
    fn duplicate_rows_use_the_oldest() {
        let mut db = setup();
        db.insert_device(&NewDevice {
            acq_period: 9000,
            last_calibration: CAL,
            firmware_version: FW,
            ..new_device(SERIAL)
        })
        .unwrap();

        let payload = store(&mut db, &synced_header(), Some(&measurement(1000, 600)));
        assert!(payload.is_empty());

        let devs = db.devices_by_serial(SERIAL).unwrap();
        assert_eq!(devs[0].last_co2, Some(600));
        assert_eq!(devs[1].last_co2, None);
    }

    #[test]
    fn failed_writes_still_answer() {
        let mut db = setup();
        let mut dev = stored(&mut db);
        dev.acq_period = 60000;
        let mut ro = ReadOnlyStore { devices: vec![dev], writes: 0 };

        let header = SensorHeader { last_calibration: 16299990001, ..synced_header() };
        let payload = store(&mut ro, &header, Some(&measurement(1000, 600)));
        assert_eq!(to_json(&payload), json!({"acqPeriod": 60000}));
        // record + calibration
        assert_eq!(ro.writes, 2);
    }
}
