//! Channel configuration files
//!
//! A channel can be described in TOML instead of code:
//!
//! ```toml
//! device = "/dev/ttyUSB0"
//! baud_rate = 115200
//! buffer_size = 255
//!
//! [read]
//! mode = "poll"
//! timeout_ms = 100
//! ```
//!
//! Everything except `device` has a default.

use crate::buffer::DEFAULT_CAPACITY;
use crate::channel::{ReadPolicy, DEFAULT_POLL_INTERVAL};
use crate::error::{Result, SerialError};
use crate::framing::FrameLayout;
use crate::line::{BaudRate, DataBits, FlowControl, LineConfig, Parity, StopBits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for opening a [`SerialChannel`](crate::SerialChannel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Device path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub device: PathBuf,
    #[serde(default)]
    pub baud_rate: BaudRate,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub flow_control: FlowControl,
    #[serde(default)]
    pub read: ReadSettings,
    #[serde(default)]
    pub frame: FrameSettings,
}

fn default_buffer_size() -> usize {
    DEFAULT_CAPACITY
}

/// How feedback reads wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadSettings {
    #[serde(default)]
    pub mode: ReadMode,
    /// Give up after this long (poll mode only)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sleep between attempts (poll mode only)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    #[default]
    Immediate,
    Poll,
}

fn default_timeout_ms() -> u64 {
    100
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            mode: ReadMode::default(),
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Field widths for header-prefixed frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSettings {
    #[serde(default = "default_head_bytes")]
    pub head_bytes: usize,
    #[serde(default = "default_data_bytes")]
    pub data_bytes: usize,
}

fn default_head_bytes() -> usize {
    FrameLayout::default().head_bytes()
}

fn default_data_bytes() -> usize {
    FrameLayout::default().data_bytes()
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            head_bytes: default_head_bytes(),
            data_bytes: default_data_bytes(),
        }
    }
}

impl ChannelConfig {
    /// Defaults for everything but the device path
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            baud_rate: BaudRate::default(),
            buffer_size: DEFAULT_CAPACITY,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            read: ReadSettings::default(),
            frame: FrameSettings::default(),
        }
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SerialError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SerialError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SerialError::Config(e.to_string()))
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Result<Self> {
        self.baud_rate = BaudRate::new(baud_rate)?;
        Ok(self)
    }

    /// Set the transmit buffer capacity
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Poll feedback reads for up to `timeout`
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.read.mode = ReadMode::Poll;
        self.read.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn line_config(&self) -> LineConfig {
        LineConfig {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            flow_control: self.flow_control,
        }
    }

    pub fn read_policy(&self) -> ReadPolicy {
        match self.read.mode {
            ReadMode::Immediate => ReadPolicy::Immediate,
            ReadMode::Poll => ReadPolicy::Poll {
                timeout: Duration::from_millis(self.read.timeout_ms),
                interval: Duration::from_millis(self.read.interval_ms),
            },
        }
    }

    pub fn frame_layout(&self) -> Result<FrameLayout> {
        FrameLayout::new(self.frame.head_bytes, self.frame.data_bytes)
    }
}
