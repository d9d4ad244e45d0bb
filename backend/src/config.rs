use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// CO2 levels (ppm) above which a reading is a warning or a danger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: i64,
    pub danger: i64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub firmware_dir: PathBuf,
    /// Shared secret devices send as `SNO-API-KEY`, auth is off when unset.
    pub api_key: Option<String>,
    /// Bearer token for the admin API, auth is off when unset.
    pub admin_key: Option<String>,
    pub bind_addr: String,
    pub port: u16,
    pub cors_origin: String,
    pub consider_offline_sec: i64,
    pub display_len_sec: i64,
    pub thresholds: Thresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            firmware_dir: PathBuf::from("/firmware"),
            api_key: None,
            admin_key: None,
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: "http://127.0.0.1:8080".to_string(),
            consider_offline_sec: 10 * 60,
            display_len_sec: 3 * 60 * 60,
            thresholds: Thresholds {
                warning: 700,
                danger: 1000,
            },
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(v) => v.trim().parse().with_context(|| format!("{key} must be a number, got {v:?}")),
        None => Ok(default),
    }
}

impl Settings {
    /// Reads the settings from the environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            firmware_dir: var("FIRMWARE_DIR").map(PathBuf::from).unwrap_or(defaults.firmware_dir),
            api_key: var("SNO_API_KEY"),
            admin_key: var("ADMIN_KEY"),
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parsed("PORT", defaults.port)?,
            cors_origin: var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            consider_offline_sec: parsed("CONSIDER_OFFLINE_SEC", defaults.consider_offline_sec)?,
            display_len_sec: parsed("DISPLAY_LEN_SEC", defaults.display_len_sec)?,
            thresholds: Thresholds {
                warning: parsed("CO2_WARNING", defaults.thresholds.warning)?,
                danger: parsed("CO2_DANGER", defaults.thresholds.danger)?,
            },
        })
    }
}
