//! Fixed-capacity transmit buffer

use crate::error::{Result, SerialError};

/// Default capacity, one frame of up to 255 bytes
pub const DEFAULT_CAPACITY: usize = 255;

/// Transmit buffer reused across transfers
///
/// The capacity is fixed when the buffer is built. Every load zero-fills the
/// whole buffer before copying, so bytes from a longer earlier frame never
/// leak into a shorter one.
#[derive(Debug, Clone)]
pub struct TxBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl TxBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SerialError::ZeroCapacity);
        }

        Ok(Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes loaded by the last successful [`load`](Self::load)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the first `length` bytes of `source` into the buffer
    ///
    /// Fails without touching the buffer if `length` exceeds the capacity or
    /// the source slice.
    pub fn load(&mut self, source: &[u8], length: usize) -> Result<()> {
        if length > self.capacity() {
            return Err(SerialError::BufferOverflow {
                requested: length,
                capacity: self.capacity(),
            });
        }
        if length > source.len() {
            return Err(SerialError::SourceTooShort {
                requested: length,
                available: source.len(),
            });
        }

        self.data.fill(0);
        self.data[..length].copy_from_slice(&source[..length]);
        self.len = length;
        Ok(())
    }

    /// Load a frame followed by a single trailing byte
    pub fn load_with_suffix(&mut self, source: &[u8], length: usize, suffix: u8) -> Result<()> {
        let total = length.saturating_add(1);
        if total > self.capacity() {
            return Err(SerialError::BufferOverflow {
                requested: total,
                capacity: self.capacity(),
            });
        }

        self.load(source, length)?;
        self.data[length] = suffix;
        self.len = total;
        Ok(())
    }

    /// The loaded frame
    pub fn frame(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole backing storage, including zero padding past the frame
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Zero the storage and forget the loaded frame
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self {
            data: vec![0u8; DEFAULT_CAPACITY].into_boxed_slice(),
            len: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(TxBuffer::new(0), Err(SerialError::ZeroCapacity)));
    }

    #[test]
    fn test_load_zero_fills_tail() {
        let mut buf = TxBuffer::new(8).unwrap();
        buf.load(&[0xAA; 8], 8).unwrap();
        buf.load(&[1, 2, 3], 3).unwrap();

        assert_eq!(buf.frame(), &[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_load_full_capacity() {
        let mut buf = TxBuffer::default();
        let source: Vec<u8> = (0..=254).collect();
        buf.load(&source, source.len()).unwrap();
        assert_eq!(buf.len(), DEFAULT_CAPACITY);
        assert_eq!(buf.frame(), source.as_slice());
    }

    #[test]
    fn test_overflow_leaves_buffer_unchanged() {
        let mut buf = TxBuffer::new(4).unwrap();
        buf.load(&[9, 8], 2).unwrap();

        let err = buf.load(&[1, 2, 3, 4, 5], 5).unwrap_err();
        assert!(matches!(
            err,
            SerialError::BufferOverflow {
                requested: 5,
                capacity: 4
            }
        ));
        assert_eq!(buf.frame(), &[9, 8]);
        assert_eq!(buf.as_slice(), &[9, 8, 0, 0]);
    }

    #[test]
    fn test_length_past_source() {
        let mut buf = TxBuffer::new(16).unwrap();
        assert!(matches!(
            buf.load(&[1, 2], 3),
            Err(SerialError::SourceTooShort {
                requested: 3,
                available: 2
            })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_source_length() {
        let mut buf = TxBuffer::new(16).unwrap();
        buf.load(&[1, 2, 3, 4], 2).unwrap();
        assert_eq!(buf.frame(), &[1, 2]);
    }

    #[test]
    fn test_suffix_counts_against_capacity() {
        let mut buf = TxBuffer::new(4).unwrap();
        buf.load_with_suffix(b"abc", 3, b'\n').unwrap();
        assert_eq!(buf.frame(), b"abc\n");

        assert!(matches!(
            buf.load_with_suffix(b"abcd", 4, b'\n'),
            Err(SerialError::BufferOverflow {
                requested: 5,
                capacity: 4
            })
        ));
        assert_eq!(buf.frame(), b"abc\n");
    }

    #[test]
    fn test_reset() {
        let mut buf = TxBuffer::new(3).unwrap();
        buf.load(&[7, 7, 7], 3).unwrap();
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), &[0, 0, 0]);
    }
}
