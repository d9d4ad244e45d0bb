use anyhow::{Context, Result};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;

use crate::calibration;
use crate::schema::*;
use crate::store::{DeviceStore, StoreError};

pub mod models;

use models::{Device, DeviceInfoUpdate, LocationUpdate, NewDevice, NewRecord, Record};

/// Readings at or above this are sensor glitches and never charted.
pub const CO2_CEILING: i64 = 5000;

// language=sql
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS devices (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        serial_number BIGINT NOT NULL,
        acq_period BIGINT NOT NULL,
        screen_mode BIGINT NOT NULL,
        last_calibration BIGINT NOT NULL,
        firmware_version BIGINT NOT NULL,
        hardware_info TEXT NOT NULL,
        reference_device INTEGER NOT NULL DEFAULT 0,
        building TEXT NOT NULL DEFAULT 's/d',
        floor TEXT NOT NULL DEFAULT 's/d',
        room TEXT NOT NULL DEFAULT 's/d',
        last_seen BIGINT,
        last_co2 BIGINT
    );

    CREATE INDEX IF NOT EXISTS devices_serial_number ON devices (serial_number);

    CREATE TABLE IF NOT EXISTS records (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        serial_number BIGINT NOT NULL,
        timestamp BIGINT NOT NULL, -- unix time, seconds
        co2 BIGINT NOT NULL,
        temperature BIGINT NOT NULL,
        uptime BIGINT NOT NULL,
        ntp_epoch BIGINT NOT NULL,
        boot_id BIGINT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS records_serial_number_timestamp
        ON records (serial_number ASC, timestamp DESC);
"#;

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    /// Opens the database and creates missing tables.
    ///
    /// An in-memory database (`:memory:`) is seeded with a demo device and record.
    pub fn connect(database_url: &str) -> Result<Self> {
        let conn = SqliteConnection::establish(database_url)
            .with_context(|| format!("cannot open database {database_url}"))?;
        let mut db = Self { conn };
        db.conn.batch_execute(SCHEMA).context("cannot create schema")?;

        if database_url.contains(":memory:") {
            info!("In-memory database, seeding demo data");
            db.seed_demo().context("cannot seed demo data")?;
        }

        Ok(db)
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.batch_execute(SCHEMA).unwrap();
        Self { conn }
    }

    fn seed_demo(&mut self) -> Result<(), StoreError> {
        self.insert_device(&NewDevice {
            serial_number: 100,
            acq_period: 5000,
            screen_mode: 0,
            last_calibration: 12302023,
            firmware_version: 2021071801,
            hardware_info: String::new(),
        })?;
        diesel::insert_into(records::table)
            .values(&NewRecord {
                serial_number: 10,
                timestamp: 14302023,
                co2: 123,
                temperature: 12,
                uptime: 412,
                ntp_epoch: 14302023,
                boot_id: 231212,
            })
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn devices(&mut self) -> Result<Vec<Device>, StoreError> {
        let res = devices::table
            .order((devices::serial_number.asc(), devices::id.asc()))
            .load::<Device>(&mut self.conn)?;
        Ok(res)
    }

    pub fn records(&mut self, serial_number: i64) -> Result<Vec<Record>, StoreError> {
        let res = records::table
            .filter(records::serial_number.eq(serial_number))
            .order(records::timestamp.asc())
            .load::<Record>(&mut self.conn)?;
        Ok(res)
    }

    /// `(timestamp, co2)` pairs of the newest `limit` plausible readings since `min_ts`,
    /// newest first.
    pub fn co2_since(&mut self, serial_number: i64, min_ts: i64, limit: i64) -> Result<Vec<(i64, i64)>, StoreError> {
        let res = records::table
            .select((records::timestamp, records::co2))
            .filter(records::serial_number.eq(serial_number))
            .filter(records::timestamp.ge(min_ts))
            .filter(records::co2.lt(CO2_CEILING))
            .order(records::timestamp.desc())
            .limit(limit)
            .load::<(i64, i64)>(&mut self.conn)?;
        Ok(res)
    }

    pub fn set_acq_period(&mut self, ids: &[i32], acq_period: i64) -> Result<usize, StoreError> {
        let n = diesel::update(devices::table.filter(devices::id.eq_any(ids)))
            .set(devices::acq_period.eq(acq_period))
            .execute(&mut self.conn)?;
        Ok(n)
    }

    pub fn set_screen_mode(&mut self, ids: &[i32], screen_mode: i64) -> Result<usize, StoreError> {
        let n = diesel::update(devices::table.filter(devices::id.eq_any(ids)))
            .set(devices::screen_mode.eq(screen_mode))
            .execute(&mut self.conn)?;
        Ok(n)
    }

    pub fn set_firmware_version(&mut self, ids: &[i32], firmware_version: i64) -> Result<usize, StoreError> {
        let n = diesel::update(devices::table.filter(devices::id.eq_any(ids)))
            .set(devices::firmware_version.eq(firmware_version))
            .execute(&mut self.conn)?;
        Ok(n)
    }

    pub fn set_location(&mut self, ids: &[i32], location: &LocationUpdate) -> Result<usize, StoreError> {
        let n = diesel::update(devices::table.filter(devices::id.eq_any(ids)))
            .set(location)
            .execute(&mut self.conn)?;
        Ok(n)
    }

    /// Flips the check digit of each device so its next poll asks it to recalibrate.
    pub fn request_recalibration(&mut self, ids: &[i32]) -> Result<usize, StoreError> {
        let n = self.conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let current = devices::table
                .select((devices::id, devices::last_calibration))
                .filter(devices::id.eq_any(ids))
                .load::<(i32, i64)>(conn)?;

            for &(id, last_calibration) in &current {
                diesel::update(devices::table.find(id))
                    .set(devices::last_calibration.eq(calibration::toggle_check(last_calibration)))
                    .execute(conn)?;
            }
            Ok(current.len())
        })?;
        Ok(n)
    }
}

impl DeviceStore for Db {
    fn devices_by_serial(&mut self, serial_number: i64) -> Result<Vec<Device>, StoreError> {
        let res = devices::table
            .filter(devices::serial_number.eq(serial_number))
            .order(devices::id.asc())
            .load::<Device>(&mut self.conn)?;
        Ok(res)
    }

    fn insert_device(&mut self, device: &NewDevice) -> Result<(), StoreError> {
        diesel::insert_into(devices::table)
            .values(device)
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn insert_record(&mut self, device_id: i32, record: &NewRecord) -> Result<(), StoreError> {
        self.conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(records::table).values(record).execute(conn)?;
            diesel::update(devices::table.find(device_id))
                .set((
                    devices::last_seen.eq(Some(record.timestamp)),
                    devices::last_co2.eq(Some(record.co2)),
                ))
                .execute(conn)?;
            Ok(())
        })?;
        Ok(())
    }

    fn update_calibration(&mut self, device_id: i32, last_calibration: i64) -> Result<(), StoreError> {
        diesel::update(devices::table.find(device_id))
            .set(devices::last_calibration.eq(last_calibration))
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn update_device_info(&mut self, device_id: i32, info: &DeviceInfoUpdate) -> Result<(), StoreError> {
        diesel::update(devices::table.find(device_id))
            .set(info)
            .execute(&mut self.conn)?;
        Ok(())
    }
}
