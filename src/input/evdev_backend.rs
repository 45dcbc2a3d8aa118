//! evdev-based dial backend for Linux
//! Requires user to be in the 'input' group

use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use evdev::{Device, EventType, InputEvent, MiscType};
use tracing::{debug, info};

use super::{DialBackend, RawRecord, RecordKind};
use crate::error::DialError;

/// List every readable input device with its name
pub fn enumerate_devices() -> Vec<(PathBuf, String)> {
    evdev::enumerate()
        .map(|(path, device)| {
            let name = device.name().unwrap_or("Unknown").to_string();
            debug!("Found input device: {} ({:?})", name, path);
            (path, name)
        })
        .collect()
}

pub struct EvdevDialBackend {
    path: PathBuf,
    device: Device,
}

impl EvdevDialBackend {
    pub fn open(path: &Path) -> Result<Self, DialError> {
        let device = Device::open(path).map_err(|e| {
            debug!("Could not open {:?}: {}", path, e);
            DialError::DeviceNotFound {
                filter: path.display().to_string(),
            }
        })?;

        info!(
            "Opened dial: {} ({:?})",
            device.name().unwrap_or("Unknown"),
            path
        );

        Ok(Self {
            path: path.to_path_buf(),
            device,
        })
    }

    /// Wait for the fd to become readable, false on timeout
    fn wait_readable(&self, timeout: Duration) -> std::io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        // SAFETY: pfd points to a single valid pollfd for the duration of the call
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(std::io::Error::from_raw_os_error(libc::ENODEV));
        }
        Ok(ready > 0)
    }
}

fn map_io_error(path: &Path, e: std::io::Error) -> DialError {
    if e.raw_os_error() == Some(libc::ENODEV) {
        DialError::DeviceDisconnected {
            device: path.to_path_buf(),
        }
    } else {
        DialError::Io {
            device: path.to_path_buf(),
            source: e,
        }
    }
}

impl DialBackend for EvdevDialBackend {
    fn path(&self) -> &Path {
        &self.path
    }

    fn fetch(&mut self, timeout: Duration) -> Result<Vec<RawRecord>, DialError> {
        match self.wait_readable(timeout) {
            Ok(false) => return Ok(Vec::new()),
            Ok(true) => {}
            Err(e) => return Err(map_io_error(&self.path, e)),
        }

        let path = &self.path;
        let events = self
            .device
            .fetch_events()
            .map_err(|e| map_io_error(path, e))?;

        Ok(events
            .map(|ev| {
                let kind = match ev.event_type() {
                    EventType::SYNCHRONIZATION => RecordKind::Sync,
                    EventType::KEY => RecordKind::Key,
                    EventType::RELATIVE => RecordKind::Relative,
                    _ => RecordKind::Other,
                };
                RawRecord::new(kind, ev.value())
            })
            .collect())
    }

    fn set_led(&mut self, brightness: u8) -> Result<(), DialError> {
        // Plain brightness, no pulse table bits
        let event = InputEvent::new(
            EventType::MISC,
            MiscType::MSC_PULSELED.0,
            brightness as i32,
        );
        self.device
            .send_events(&[event])
            .map_err(|e| map_io_error(&self.path, e))
    }
}
