//! Serial port transport and port enumeration

use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{
    available_ports, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits,
};
use tracing::{debug, info};

use crate::error::LinkError;
use crate::transport::{read_exact_within, Transport};

/// Baud rate the box firmware listens at
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

impl SerialConfig {
    /// Settings for `port` at the default baud rate
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Transport over a local serial port (8N1, no flow control)
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport for the given settings
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| LinkError::ConnectFailed {
                connector: self.config.port.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Opened serial port {} at {} baud",
            self.config.port, self.config.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.config.port);
        }
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        read_exact_within(port, buffer, timeout, |port, remaining| {
            port.set_timeout(remaining)?;
            Ok(())
        })
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        let port = self.port_mut()?;
        port.write_all(buffer)?;
        port.flush()?;
        Ok(())
    }

    fn connector_name(&self) -> String {
        self.config.port.clone()
    }
}

/// Information about a serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }
}

/// Enumerate serial ports a box may be attached to
///
/// Bluetooth and debug ports are skipped.
pub fn list_ports() -> Result<Vec<SerialPortInfo>, LinkError> {
    let ports = available_ports()?;
    let result: Vec<_> = ports
        .into_iter()
        .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
        .filter(|p| !p.port.contains("Bluetooth") && !p.port.contains("debug"))
        .collect();

    info!("Found {} serial port(s)", result.len());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x0403,
            pid: 0x6001,
            serial_number: None,
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyUSB0".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x0403));
        assert_eq!(info.pid, Some(0x6001));
        assert_eq!(info.product.as_deref(), Some("FT232R"));
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let mut transport = SerialTransport::new(SerialConfig::new("/dev/null-port"));
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.write_bytes(&[0x00]),
            Err(LinkError::NotConnected)
        ));
        assert!(transport.close().is_ok());
    }
}
