//! Dial backend trait and device discovery

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DialError;

/// Class of a raw input record, reduced to what the dial cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Synchronization marker between event batches
    Sync,
    /// Button state change
    Key,
    /// Relative motion (rotation)
    Relative,
    /// Anything else the device reports
    Other,
}

/// A raw input record: type tag plus signed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub value: i32,
}

impl RawRecord {
    pub fn new(kind: RecordKind, value: i32) -> Self {
        Self { kind, value }
    }
}

/// Source of raw records for a dial
pub trait DialBackend: Send {
    /// Device path, for logging and error reporting
    fn path(&self) -> &Path;

    /// Wait up to `timeout` for records.
    /// Returns an empty batch on timeout so the caller can check for cancellation.
    fn fetch(&mut self, timeout: Duration) -> Result<Vec<RawRecord>, DialError>;

    /// Set the dial's LED brightness. Devices without an LED ignore this.
    fn set_led(&mut self, _brightness: u8) -> Result<(), DialError> {
        Ok(())
    }
}

/// Find input devices whose name contains `name_filter`
pub fn find_devices(name_filter: &str) -> Result<Vec<PathBuf>, DialError> {
    #[cfg(target_os = "linux")]
    let candidates = super::evdev_backend::enumerate_devices();
    #[cfg(not(target_os = "linux"))]
    let candidates: Vec<(PathBuf, String)> = Vec::new();

    filter_devices(candidates, name_filter)
}

/// Keep the devices whose name matches, failing when none do
pub fn filter_devices(
    candidates: impl IntoIterator<Item = (PathBuf, String)>,
    name_filter: &str,
) -> Result<Vec<PathBuf>, DialError> {
    let matches: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|(_, name)| name.contains(name_filter))
        .map(|(path, name)| {
            tracing::debug!("Dial candidate: {} ({:?})", name, path);
            path
        })
        .collect();

    if matches.is_empty() {
        return Err(DialError::DeviceNotFound {
            filter: name_filter.to_string(),
        });
    }

    Ok(matches)
}

/// Open the dial at `path` with the platform backend
pub fn open_backend(path: &Path) -> Result<Box<dyn DialBackend>, DialError> {
    #[cfg(target_os = "linux")]
    {
        let backend = super::evdev_backend::EvdevDialBackend::open(path)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(DialError::DeviceNotFound {
            filter: path.display().to_string(),
        })
    }
}
