//! Terminal device access
//!
//! Wraps the native `serialport` tty handle with the behaviour the channel
//! needs. The line settings are applied at open and stale input is thrown
//! away. Reads and writes never wait: nothing available, or no room in the
//! output queue, reports zero bytes. Draining output still blocks.

use crate::error::{Result, SerialError};
use crate::line::{BaudRate, LineConfig};
use serialport::{ClearBuffer, SerialPort, TTYPort};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

/// An open terminal device
pub struct TtyHandle {
    port: TTYPort,
}

impl TtyHandle {
    /// Open `path` read/write with `line` applied, then discard pending input
    pub fn open(path: &Path, line: &LineConfig) -> Result<Self> {
        let port = serialport::new(path.to_string_lossy(), line.baud_rate.value())
            .data_bits(line.data_bits.into())
            .parity(line.parity.into())
            .stop_bits(line.stop_bits.into())
            .flow_control(line.flow_control.into())
            .timeout(Duration::ZERO)
            .open_native()
            .map_err(|e| open_error(path, e))?;

        if unsafe { libc::isatty(port.as_raw_fd()) } != 1 {
            return Err(SerialError::NotATerminal {
                path: path.to_path_buf(),
            });
        }

        set_nonblocking(port.as_raw_fd()).map_err(|source| SerialError::Configure {
            op: "non-blocking mode",
            source,
        })?;

        port.clear(ClearBuffer::Input)
            .map_err(|e| SerialError::Configure {
                op: "discard input",
                source: e.into(),
            })?;

        Ok(Self { port })
    }

    /// One write attempt; a full output queue counts as zero bytes
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        loop {
            match self.port.write(data) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return nothing_ready(other),
            }
        }
    }

    /// One read attempt; no data available counts as zero bytes
    pub fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.port.read(out) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return nothing_ready(other),
            }
        }
    }

    /// Block until all queued output has been transmitted
    pub fn drain(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    /// Line settings as the driver reports them
    pub fn settings(&self) -> Result<LineConfig> {
        let query = |e: serialport::Error| SerialError::Configure {
            op: "read line settings",
            source: e.into(),
        };

        Ok(LineConfig {
            baud_rate: BaudRate::new(self.port.baud_rate().map_err(query)?)?,
            data_bits: self.port.data_bits().map_err(query)?.into(),
            parity: self.port.parity().map_err(query)?.into(),
            stop_bits: self.port.stop_bits().map_err(query)?.into(),
            flow_control: self.port.flow_control().map_err(query)?.into(),
        })
    }
}

impl AsRawFd for TtyHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.port.as_raw_fd()
    }
}

impl fmt::Debug for TtyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtyHandle")
            .field("fd", &self.port.as_raw_fd())
            .finish()
    }
}

fn nothing_ready(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => Ok(0),
        other => other,
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Turn a failed open into the OS reason, or `NotATerminal` for plain files
fn open_error(path: &Path, err: serialport::Error) -> SerialError {
    let probe = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path);

    match probe {
        Err(source) => SerialError::Open {
            path: path.to_path_buf(),
            source,
        },
        Ok(file) if !file.is_terminal() => SerialError::NotATerminal {
            path: path.to_path_buf(),
        },
        Ok(_) => SerialError::Open {
            path: path.to_path_buf(),
            source: err.into(),
        },
    }
}
