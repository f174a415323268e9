//! Finding the board
//!
//! Lists serial devices and picks out the USB-to-UART bridge chips that
//! FPGA and MCU boards put in front of their UART. Only built with the
//! `serial` feature (needs libudev on Linux).

use crate::error::{Result, SerialError};
use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};
use std::fmt;

/// USB-to-UART bridge families recognised by VID/PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bridge {
    /// FTDI FT232/FT2232 (also the Digilent boards)
    Ftdi,
    Cp210x,
    Ch34x,
    Pl2303,
    /// RP2040 USB CDC
    Pico,
}

impl Bridge {
    pub fn identify(vid: u16, pid: u16) -> Option<Self> {
        match (vid, pid) {
            (0x0403, _) => Some(Bridge::Ftdi),
            (0x10c4, 0xea60 | 0xea70) => Some(Bridge::Cp210x),
            (0x1a86, 0x7523 | 0x5523) => Some(Bridge::Ch34x),
            (0x067b, 0x2303) => Some(Bridge::Pl2303),
            (0x2e8a, _) => Some(Bridge::Pico),
            _ => None,
        }
    }
}

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bridge::Ftdi => "FTDI",
            Bridge::Cp210x => "CP210x",
            Bridge::Ch34x => "CH34x",
            Bridge::Pl2303 => "PL2303",
            Bridge::Pico => "RP2040",
        };
        f.write_str(name)
    }
}

/// A serial device that could be handed to [`SerialChannel::open`](crate::SerialChannel::open)
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub path: String,
    /// USB identity, for devices behind a USB bridge
    pub usb: Option<UsbDevice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsbDevice {
    pub vid: u16,
    pub pid: u16,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// The bridge chip in front of this port, if it is a known one
    pub fn bridge(&self) -> Option<Bridge> {
        self.usb.as_ref().and_then(|u| Bridge::identify(u.vid, u.pid))
    }
}

impl From<UsbPortInfo> for UsbDevice {
    fn from(info: UsbPortInfo) -> Self {
        Self {
            vid: info.vid,
            pid: info.pid,
            product: info.product.or(info.manufacturer),
            serial_number: info.serial_number,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(port: SerialPortInfo) -> Self {
        let usb = match port.port_type {
            SerialPortType::UsbPort(info) => Some(info.into()),
            _ => None,
        };
        Self {
            path: port.port_name,
            usb,
        }
    }
}

/// Every serial device the OS reports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| SerialError::Io(e.into()))?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// Only the devices behind a recognised USB-to-UART bridge
pub fn detect_uart_bridges() -> Result<Vec<PortInfo>> {
    Ok(list_ports()?
        .into_iter()
        .filter(|p| p.bridge().is_some())
        .collect())
}
