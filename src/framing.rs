//! Frame wrapping for the feedback variants
//!
//! Two wrappers sit on top of the raw frame:
//! - line-feed terminated: the frame is followed by `\n`, and the reply is
//!   read until its own `\n`
//! - header prefixed: a big-endian header field followed by a big-endian
//!   data field, widths set by a [`FrameLayout`]

use crate::error::{Result, SerialError};
use byteorder::{BigEndian, WriteBytesExt};

/// Line terminator for LF-framed transfers
pub const LF: u8 = b'\n';

/// Position of the first LF in `bytes`
pub fn find_terminator(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == LF)
}

/// Field widths of a header-prefixed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    head_bytes: usize,
    data_bytes: usize,
}

impl FrameLayout {
    /// Largest field width, one `u64`
    pub const MAX_FIELD_BYTES: usize = 8;

    pub fn new(head_bytes: usize, data_bytes: usize) -> Result<Self> {
        let valid = 1..=Self::MAX_FIELD_BYTES;
        if !valid.contains(&head_bytes) || !valid.contains(&data_bytes) {
            return Err(SerialError::InvalidFrameLayout {
                head_bytes,
                data_bytes,
            });
        }
        Ok(Self {
            head_bytes,
            data_bytes,
        })
    }

    pub fn head_bytes(&self) -> usize {
        self.head_bytes
    }

    pub fn data_bytes(&self) -> usize {
        self.data_bytes
    }

    /// Total encoded length
    pub fn frame_len(&self) -> usize {
        self.head_bytes + self.data_bytes
    }

    /// Encode `head` then `data`, both big-endian
    pub fn encode(&self, head: u64, data: u64) -> Result<Vec<u8>> {
        check_fits(head, self.head_bytes)?;
        check_fits(data, self.data_bytes)?;

        let mut out = Vec::with_capacity(self.frame_len());
        out.write_uint::<BigEndian>(head, self.head_bytes)?;
        out.write_uint::<BigEndian>(data, self.data_bytes)?;
        Ok(out)
    }
}

impl Default for FrameLayout {
    /// One header byte, two data bytes
    fn default() -> Self {
        Self {
            head_bytes: 1,
            data_bytes: 2,
        }
    }
}

fn check_fits(value: u64, bytes: usize) -> Result<()> {
    if bytes >= FrameLayout::MAX_FIELD_BYTES || value >> (bytes * 8) == 0 {
        Ok(())
    } else {
        Err(SerialError::FieldOverflow { value, bytes })
    }
}
