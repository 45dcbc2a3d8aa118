//! Serial indicator discovery

use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, info, warn};

use super::{IndicatorDevice, WriterIndicator};
use crate::config::IndicatorConfig;
use crate::error::IndicatorError;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// A serial port that looks like an indicator board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorPort {
    pub path: String,
    pub description: String,
}

/// Human-readable description of a port, like pyserial's
fn describe(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                "USB Serial".to_string()
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Whether a port is an indicator according to the configured markers and prefixes
pub fn is_indicator(path: &str, description: &str, config: &IndicatorConfig) -> bool {
    config
        .description_markers
        .iter()
        .any(|marker| description.contains(marker.as_str()))
        || config
            .path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
}

/// Enumerate serial ports and keep the indicator candidates
pub fn find_indicator_ports(config: &IndicatorConfig) -> Vec<IndicatorPort> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            return Vec::new();
        }
    };

    ports
        .iter()
        .map(|port| IndicatorPort {
            path: port.port_name.clone(),
            description: describe(port),
        })
        .filter(|port| {
            let keep = is_indicator(&port.path, &port.description, config);
            debug!("Serial port {} ({}): indicator={}", port.path, port.description, keep);
            keep
        })
        .collect()
}

/// Open one indicator port
pub fn open_port(
    port: &IndicatorPort,
    baud_rate: u32,
) -> Result<Box<dyn IndicatorDevice>, IndicatorError> {
    let serial = serialport::new(&port.path, baud_rate)
        .timeout(WRITE_TIMEOUT)
        .open()
        .map_err(|source| IndicatorError::Open {
            device: port.path.clone(),
            source,
        })?;

    Ok(Box::new(WriterIndicator::new(port.path.clone(), serial)))
}

/// Open every indicator that can be opened. Ports that fail are logged and skipped.
pub fn open_indicators(config: &IndicatorConfig) -> Vec<Box<dyn IndicatorDevice>> {
    let devices: Vec<Box<dyn IndicatorDevice>> = find_indicator_ports(config)
        .iter()
        .filter_map(|port| match open_port(port, config.baud_rate) {
            Ok(device) => {
                info!("Indicator attached: {} ({})", port.path, port.description);
                Some(device)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        warn!("No indicator devices found");
    } else if config.settle_delay_ms > 0 {
        // Boards reset when the port opens and drop anything sent meanwhile
        std::thread::sleep(Duration::from_millis(config.settle_delay_ms));
    }

    devices
}
