//! Best-effort fan-out of status commands

use std::io::Write;

use tracing::{debug, info, warn};

use super::IndicatorStatus;
use crate::error::IndicatorError;

/// A write-only command sink
pub trait IndicatorDevice: Send {
    fn name(&self) -> &str;

    fn send(&mut self, command: &str) -> Result<(), IndicatorError>;
}

/// Indicator on top of any writer (serial port, file, buffer)
pub struct WriterIndicator<W: Write + Send> {
    name: String,
    writer: W,
}

impl<W: Write + Send> WriterIndicator<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }
}

impl<W: Write + Send> IndicatorDevice for WriterIndicator<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, command: &str) -> Result<(), IndicatorError> {
        self.writer
            .write_all(command.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|source| IndicatorError::Write {
                device: self.name.clone(),
                source,
            })
    }
}

/// Owns every attached indicator for its lifetime
#[derive(Default)]
pub struct IndicatorDriver {
    devices: Vec<Box<dyn IndicatorDevice>>,
}

impl IndicatorDriver {
    pub fn new(devices: Vec<Box<dyn IndicatorDevice>>) -> Self {
        Self { devices }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Write the status command to every device.
    /// A failing device is logged and skipped. Returns how many devices accepted it.
    pub fn set_status(&mut self, status: IndicatorStatus) -> usize {
        let command = status.command().to_string();
        info!("Indicator switching to {} ({})", status, command);

        let mut delivered = 0;
        for device in &mut self.devices {
            match device.send(&command) {
                Ok(()) => {
                    debug!("Sent {} to {}", command, device.name());
                    delivered += 1;
                }
                Err(e) => warn!("{}", e),
            }
        }
        delivered
    }

    /// Like [`set_status`](Self::set_status) for a raw status code; unknown codes do nothing
    pub fn set_status_code(&mut self, code: u8) -> usize {
        match IndicatorStatus::from_code(code) {
            Some(status) => self.set_status(status),
            None => {
                debug!("Ignoring unknown indicator status code {}", code);
                0
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every command it receives
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDevice {
        pub(crate) sent: Arc<Mutex<Vec<String>>>,
    }

    impl IndicatorDevice for RecordingDevice {
        fn name(&self) -> &str {
            "recording-device"
        }

        fn send(&mut self, command: &str) -> Result<(), IndicatorError> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }

    struct BrokenDevice;

    impl IndicatorDevice for BrokenDevice {
        fn name(&self) -> &str {
            "broken"
        }

        fn send(&mut self, _command: &str) -> Result<(), IndicatorError> {
            Err(IndicatorError::Write {
                device: "broken".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
            })
        }
    }

    #[test]
    fn test_repeated_status_sends_same_command() {
        let device = RecordingDevice::default();
        let mut driver = IndicatorDriver::new(vec![Box::new(device.clone())]);

        assert_eq!(driver.set_status(IndicatorStatus::Recording), 1);
        assert_eq!(driver.set_status(IndicatorStatus::Recording), 1);
        assert_eq!(
            *device.sent.lock().unwrap(),
            vec!["SetLed,1,0,0;".to_string(), "SetLed,1,0,0;".to_string()]
        );
    }

    #[test]
    fn test_failing_device_does_not_block_others() {
        let first = RecordingDevice::default();
        let last = RecordingDevice::default();
        let mut driver = IndicatorDriver::new(vec![
            Box::new(first.clone()),
            Box::new(BrokenDevice),
            Box::new(last.clone()),
        ]);

        assert_eq!(driver.set_status(IndicatorStatus::Scheduled), 2);
        assert_eq!(*first.sent.lock().unwrap(), vec!["SetLed,0,1,0;".to_string()]);
        assert_eq!(*last.sent.lock().unwrap(), vec!["SetLed,0,1,0;".to_string()]);
    }

    #[test]
    fn test_unknown_code_is_noop() {
        let device = RecordingDevice::default();
        let mut driver = IndicatorDriver::new(vec![Box::new(device.clone())]);

        assert_eq!(driver.set_status_code(42), 0);
        assert!(device.sent.lock().unwrap().is_empty());
        assert_eq!(driver.set_status_code(0), 1);
    }

    #[test]
    fn test_writer_indicator_writes_wire_text() {
        let mut indicator = WriterIndicator::new("buffer", Vec::new());
        indicator.send("SetLed,0,0,0;").unwrap();
        assert_eq!(indicator.writer, b"SetLed,0,0,0;".to_vec());
        assert_eq!(indicator.name(), "buffer");
    }

    #[test]
    fn test_no_devices_is_fine() {
        let mut driver = IndicatorDriver::default();
        assert_eq!(driver.device_count(), 0);
        assert_eq!(driver.set_status(IndicatorStatus::Idle), 0);
    }
}
