//! Wire protocol shared between the CO2 sensors and the ingestion server.

pub mod req;
