//! Serial channel: one device, one transmit buffer, synchronous transfers
//!
//! A [`SerialChannel`] is either closed (no device handle) or open (handle
//! valid, line settings fixed). Every transfer requires the open state and
//! fails with [`SerialError::NotOpen`] before touching the OS otherwise.
//!
//! Writes always wait for the output to drain. Reads never wait for data
//! unless the channel's [`ReadPolicy`] says to poll.

use crate::buffer::TxBuffer;
use crate::config::ChannelConfig;
use crate::error::{Result, SerialError};
use crate::framing::{find_terminator, FrameLayout, LF};
use crate::line::LineConfig;
use crate::tty::TtyHandle;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Sleep between read attempts when polling
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How feedback reads wait for the peer's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// A single non-blocking read straight after the write drains
    #[default]
    Immediate,
    /// Keep reading until the reply is complete or `timeout` elapses
    Poll { timeout: Duration, interval: Duration },
}

impl ReadPolicy {
    /// Poll for up to `timeout` with the default interval
    pub fn poll(timeout: Duration) -> Self {
        ReadPolicy::Poll {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct Connection {
    tty: TtyHandle,
    path: PathBuf,
    line: LineConfig,
}

/// Point-to-point frame transport over a serial device
///
/// Not shareable between callers: every operation takes `&mut self`. Wrap
/// the channel in a mutex if several threads need it.
#[derive(Debug)]
pub struct SerialChannel {
    conn: Option<Connection>,
    tx: TxBuffer,
    last_len: usize,
    read_policy: ReadPolicy,
    layout: FrameLayout,
}

impl SerialChannel {
    /// A closed channel with a transmit buffer of `buffer_size` bytes
    pub fn new(buffer_size: usize) -> Result<Self> {
        Ok(Self {
            conn: None,
            tx: TxBuffer::new(buffer_size)?,
            last_len: 0,
            read_policy: ReadPolicy::default(),
            layout: FrameLayout::default(),
        })
    }

    /// Open `path` as a raw 8N1 line at `baud_rate`
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, buffer_size: usize) -> Result<Self> {
        let line = LineConfig::new(baud_rate)?;
        let mut channel = Self::new(buffer_size)?;
        channel.connect(path, line)?;
        Ok(channel)
    }

    /// Open a channel described by a configuration file
    pub fn open_with(config: &ChannelConfig) -> Result<Self> {
        let line = config.line_config();
        let mut channel = Self::new(config.buffer_size)?;
        channel.set_read_policy(config.read_policy());
        channel.set_frame_layout(config.frame_layout()?);
        channel.connect(&config.device, line)?;
        Ok(channel)
    }

    /// Open the device with `line` applied
    ///
    /// Pending input is discarded once the settings are in place. On any
    /// failure the channel stays closed. A successful connect starts from an
    /// empty buffer.
    pub fn connect(&mut self, path: impl AsRef<Path>, line: LineConfig) -> Result<()> {
        if self.conn.is_some() {
            return Err(SerialError::AlreadyOpen);
        }

        let path = path.as_ref();
        let tty = TtyHandle::open(path, &line)?;

        info!("Opened {} at {}", path.display(), line);

        self.tx.reset();
        self.last_len = 0;
        self.conn = Some(Connection {
            tty,
            path: path.to_path_buf(),
            line,
        });
        Ok(())
    }

    /// Release the device handle
    pub fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(SerialError::AlreadyClosed)?;
        info!("Closed {}", conn.path.display());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Device path, while open
    pub fn path(&self) -> Option<&Path> {
        self.conn.as_ref().map(|c| c.path.as_path())
    }

    /// Line settings in effect, while open
    pub fn line(&self) -> Option<&LineConfig> {
        self.conn.as_ref().map(|c| &c.line)
    }

    /// Line settings as the driver reports them
    pub fn device_settings(&self) -> Result<LineConfig> {
        self.tty()?.settings()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Byte count of the most recent load, write or read
    pub fn last_len(&self) -> usize {
        self.last_len
    }

    /// Full transmit buffer, zero padding included
    pub fn buffer(&self) -> &[u8] {
        self.tx.as_slice()
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn set_read_policy(&mut self, policy: ReadPolicy) {
        self.read_policy = policy;
    }

    pub fn frame_layout(&self) -> FrameLayout {
        self.layout
    }

    /// Field widths used by [`write_with_feedback_hex`](Self::write_with_feedback_hex)
    pub fn set_frame_layout(&mut self, layout: FrameLayout) {
        self.layout = layout;
    }

    /// Zero the transmit buffer and copy `bytes[..length]` into it
    pub fn load_buffer(&mut self, bytes: &[u8], length: usize) -> Result<()> {
        self.tx.load(bytes, length)?;
        self.last_len = length;
        Ok(())
    }

    /// Write the loaded frame and wait for it to leave the device
    ///
    /// The frame is whatever the last successful load put in the buffer;
    /// reads in between do not shorten it. Returns the OS-reported count,
    /// which may be short.
    pub fn write_buffer(&mut self) -> Result<usize> {
        let tty = self.conn.as_mut().map(|c| &mut c.tty).ok_or(SerialError::NotOpen)?;
        let frame = self.tx.frame();

        let written = tty.write(frame)?;
        tty.drain()?;

        if written < frame.len() {
            warn!("Short write: {} of {} bytes", written, frame.len());
        } else {
            debug!("TX {} bytes: {:02x?}", written, frame);
        }

        self.last_len = written;
        Ok(written)
    }

    /// Send a frame without reading a reply
    pub fn write_without_feedback(&mut self, bytes: &[u8], length: usize) -> Result<usize> {
        self.tty()?;
        self.load_buffer(bytes, length)?;
        self.write_buffer()
    }

    /// Send a frame, then read up to `length` reply bytes into `out`
    pub fn write_with_feedback(
        &mut self,
        bytes: &[u8],
        length: usize,
        out: &mut [u8],
    ) -> Result<usize> {
        self.tty()?;
        check_output(out, length)?;

        self.load_buffer(bytes, length)?;
        self.write_buffer()?;
        self.read_reply(&mut out[..length], self.read_policy, false)
    }

    /// Send a frame terminated by `\n`, then read a reply up to its own `\n`
    ///
    /// Returns the reply length, terminator included. Bytes after the
    /// terminator stay queued on the device.
    pub fn write_with_feedback_lf(
        &mut self,
        bytes: &[u8],
        length: usize,
        out: &mut [u8],
    ) -> Result<usize> {
        self.tty()?;
        self.tx.load_with_suffix(bytes, length, LF)?;
        self.last_len = self.tx.len();
        self.write_buffer()?;
        self.read_reply(out, self.read_policy, true)
    }

    /// Send a header-prefixed frame and read back a reply of the same length
    pub fn write_with_feedback_hex(&mut self, head: u64, data: u64, out: &mut [u8]) -> Result<usize> {
        self.tty()?;
        let frame = self.layout.encode(head, data)?;
        self.write_with_feedback(&frame, frame.len(), out)
    }

    /// A single non-blocking read of up to `n_bytes` into `out`
    ///
    /// Returns 0 when nothing is waiting.
    pub fn read_raw(&mut self, out: &mut [u8], n_bytes: usize) -> Result<usize> {
        self.tty()?;
        check_output(out, n_bytes)?;
        let n = self.tty_mut()?.read(&mut out[..n_bytes])?;
        self.last_len = n;
        Ok(n)
    }

    /// Poll until `out` is full or `timeout` elapses
    pub fn read_exact_within(&mut self, out: &mut [u8], timeout: Duration) -> Result<usize> {
        self.read_reply(out, ReadPolicy::poll(timeout), false)
    }

    fn tty(&self) -> Result<&TtyHandle> {
        self.conn
            .as_ref()
            .map(|c| &c.tty)
            .ok_or(SerialError::NotOpen)
    }

    fn tty_mut(&mut self) -> Result<&mut TtyHandle> {
        self.conn
            .as_mut()
            .map(|c| &mut c.tty)
            .ok_or(SerialError::NotOpen)
    }

    fn read_reply(&mut self, out: &mut [u8], policy: ReadPolicy, until_lf: bool) -> Result<usize> {
        let tty = self.tty_mut()?;
        let deadline = match policy {
            ReadPolicy::Immediate => None,
            ReadPolicy::Poll { timeout, .. } => Some(Instant::now() + timeout),
        };

        let mut got = 0;
        loop {
            let mut progressed = false;
            if got < out.len() {
                // One byte at a time keeps anything past the terminator queued
                let end = if until_lf { got + 1 } else { out.len() };
                let n = tty.read(&mut out[got..end])?;
                got += n;
                progressed = n > 0;
            }

            let complete = if until_lf {
                find_terminator(&out[..got]).is_some() || got == out.len()
            } else {
                got == out.len()
            };
            if complete {
                break;
            }
            if until_lf && progressed {
                continue;
            }

            match (policy, deadline) {
                (ReadPolicy::Poll { interval, .. }, Some(deadline)) if Instant::now() < deadline => {
                    std::thread::sleep(interval);
                }
                _ => break,
            }
        }

        if got < out.len() && !(until_lf && find_terminator(&out[..got]).is_some()) {
            debug!("Short read: {} of {} bytes", got, out.len());
        } else {
            debug!("RX {} bytes: {:02x?}", got, &out[..got]);
        }

        self.last_len = got;
        Ok(got)
    }
}

/// Reply buffers must hold every byte asked for
fn check_output(out: &[u8], wanted: usize) -> Result<()> {
    if out.len() < wanted {
        return Err(SerialError::OutputTooSmall {
            needed: wanted,
            available: out.len(),
        });
    }
    Ok(())
}
