//! UART frame transport
//!
//! A small synchronous transport for talking to FPGA/MCU boards over a
//! USB-to-serial bridge: open a tty, configure it as a raw line, then move
//! fixed-size byte frames back and forth.
//!
//! ```no_run
//! use uart_link::SerialChannel;
//!
//! # fn main() -> uart_link::Result<()> {
//! let mut channel = SerialChannel::open("/dev/ttyUSB0", 115200, 255)?;
//! channel.write_without_feedback(&[0x01, 0x02, 0x03], 3)?;
//!
//! let mut reply = [0u8; 3];
//! let n = channel.read_raw(&mut reply, 3)?;
//! println!("{:02x?}", &reply[..n]);
//! channel.close()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod framing;
pub mod line;
#[cfg(feature = "serial")]
pub mod ports;
pub mod tty;

pub use buffer::TxBuffer;
pub use channel::{ReadPolicy, SerialChannel};
pub use config::ChannelConfig;
pub use error::{Result, SerialError};
pub use framing::FrameLayout;
pub use line::{BaudRate, DataBits, FlowControl, LineConfig, Parity, StopBits};
