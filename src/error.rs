//! Error types for the UART transport

use std::path::PathBuf;

/// Everything that can go wrong between opening a device and moving a frame
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Failed to open serial device {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a terminal device", .path.display())]
    NotATerminal { path: PathBuf },

    #[error("Failed to configure serial line ({op}): {source}")]
    Configure {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    #[error("Unsupported data bits: {0}")]
    UnsupportedDataBits(u8),

    #[error("Unsupported stop bits: {0}")]
    UnsupportedStopBits(u8),

    #[error("Transmit buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("Frame of {requested} bytes exceeds buffer capacity of {capacity} bytes")]
    BufferOverflow { requested: usize, capacity: usize },

    #[error("Requested {requested} bytes but only {available} are available")]
    SourceTooShort { requested: usize, available: usize },

    #[error("Output buffer holds {available} bytes but {needed} were requested")]
    OutputTooSmall { needed: usize, available: usize },

    #[error("Value {value:#x} does not fit in {bytes} byte(s)")]
    FieldOverflow { value: u64, bytes: usize },

    #[error("Invalid frame layout: head {head_bytes} byte(s), data {data_bytes} byte(s)")]
    InvalidFrameLayout { head_bytes: usize, data_bytes: usize },

    #[error("Serial channel is not open")]
    NotOpen,

    #[error("Serial channel is already open")]
    AlreadyOpen,

    #[error("Serial channel is already closed")]
    AlreadyClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SerialError>;
