use std::path::{Path, PathBuf};

use common::req::{LATEST_FIRMWARE, REGISTER_FIRMWARE};
use log::warn;

const EXTENSION: &str = "ino.bin";

/// Firmware images stored as `<version>.ino.bin` in one directory.
///
/// Nothing is cached, every lookup reads the directory.
#[derive(Debug, Clone)]
pub struct FirmwareRepository {
    dir: PathBuf,
}

impl FirmwareRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Version of the release file (`20*.ino.bin`) that sorts last by name.
    pub fn latest_version(&self) -> Option<i64> {
        let dir = glob::Pattern::escape(self.dir.to_str()?);
        let pattern = Path::new(&dir).join(format!("20*.{EXTENSION}"));
        let pattern = pattern.to_str()?;

        let mut names: Vec<String> = match glob::glob(pattern) {
            Ok(paths) => paths
                .filter_map(|entry| entry.ok())
                .filter_map(|path| path.file_name()?.to_str().map(str::to_owned))
                .collect(),
            Err(err) => {
                warn!("Bad firmware pattern {pattern}: {err}");
                return None;
            }
        };
        names.sort();

        names.iter().rev().find_map(|name| version_of(name))
    }

    pub fn version_exists(&self, version: i64) -> bool {
        self.file_for(&version.to_string()).is_file()
    }

    /// File served for `/updates/<requested>`.
    pub fn resolve(&self, requested: i64) -> Option<PathBuf> {
        match requested {
            REGISTER_FIRMWARE => Some(self.file_for("first")),
            LATEST_FIRMWARE => self.latest_version().map(|v| self.file_for(&v.to_string())),
            v => Some(self.file_for(&v.to_string())),
        }
    }

    fn file_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{EXTENSION}"))
    }
}

fn version_of(file_name: &str) -> Option<i64> {
    let (stem, _) = file_name.split_once('.')?;
    stem.parse().ok()
}
