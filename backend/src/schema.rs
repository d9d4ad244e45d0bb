// kept in sync with SCHEMA in db.rs

diesel::table! {
    devices (id) {
        id -> Integer,
        serial_number -> BigInt,
        acq_period -> BigInt,
        screen_mode -> BigInt,
        last_calibration -> BigInt,
        firmware_version -> BigInt,
        hardware_info -> Text,
        reference_device -> Integer,
        building -> Text,
        floor -> Text,
        room -> Text,
        last_seen -> Nullable<BigInt>,
        last_co2 -> Nullable<BigInt>,
    }
}

diesel::table! {
    records (id) {
        id -> Integer,
        serial_number -> BigInt,
        timestamp -> BigInt,
        co2 -> BigInt,
        temperature -> BigInt,
        uptime -> BigInt,
        ntp_epoch -> BigInt,
        boot_id -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(devices, records,);
