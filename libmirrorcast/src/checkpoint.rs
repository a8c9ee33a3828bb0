//! Last-run timestamp persisted between runs
//!
//! Stored as fractional Unix seconds in a plain text file (e.g. `1700000000.25`).

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored time, or `None` if nothing has been saved yet
    pub fn load(&self) -> Result<Option<DateTime<Utc>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                }
                .into())
            }
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason,
        };

        let seconds: f64 = content
            .trim()
            .parse()
            .map_err(|e: std::num::ParseFloatError| corrupt(e.to_string()))?;

        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9).round() as u32;
        let time = DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
            .ok_or_else(|| corrupt(format!("timestamp {} out of range", seconds)))?;

        Ok(Some(time))
    }

    pub fn save(&self, time: DateTime<Utc>) -> Result<()> {
        let io_error = |e: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1e6;
        std::fs::write(&self.path, seconds.to_string()).map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MirrorError;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("last_checked"));
        assert!(checkpoint.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("last_checked"));
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        checkpoint.save(time).unwrap();
        assert_eq!(checkpoint.load().unwrap(), Some(time));
    }

    #[test]
    fn test_save_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("youtube").join("last_checked");
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        Checkpoint::new(&path).save(time).unwrap();
        assert_eq!(Checkpoint::new(&path).load().unwrap(), Some(time));
    }

    #[test]
    fn test_reads_fractional_seconds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_checked");
        std::fs::write(&path, "1700000000.5\n").unwrap();

        let loaded = Checkpoint::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.timestamp(), 1_700_000_000);
        assert_eq!(loaded.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_checked");
        std::fs::write(&path, "yesterday").unwrap();

        let result = Checkpoint::new(&path).load();
        assert!(matches!(
            result,
            Err(MirrorError::Store(StoreError::Corrupt { .. }))
        ));
    }
}
