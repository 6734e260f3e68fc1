use serialport::SerialPortType;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{LinkSettings, PortOpener, SensorStream};

/// Opens real serial ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<SensorStream> {
        let port = serialport::new(port_name, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|err| TransportError::Open {
                port: port_name.to_string(),
                source: err.into(),
            })?;
        debug!(port = port_name, baud = settings.baud_rate, "opened serial port");
        Ok(SensorStream::from_serial(port_name, port))
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

/// One entry of the host's serial port list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Name to pass to [`PortOpener::open`] (`COM3`, `/dev/ttyUSB0`, ...).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Hardware id (`USB VID:PID=...`) when known.
    pub hwid: String,
}

/// Enumerate serial ports available on this host.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|err| TransportError::Enumerate(err.into()))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let (description, hwid) = describe(&p.port_type);
            PortInfo {
                name: p.port_name,
                description,
                hwid,
            }
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> (String, String) {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_else(|| "USB serial device".to_string());
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                hwid.push_str(&format!(" SER={serial}"));
            }
            (description, hwid)
        }
        SerialPortType::PciPort => ("PCI serial port".to_string(), "PCI".to_string()),
        SerialPortType::BluetoothPort => ("Bluetooth serial port".to_string(), "BTH".to_string()),
        SerialPortType::Unknown => ("serial port".to_string(), "n/a".to_string()),
    }
}
