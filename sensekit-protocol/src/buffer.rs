//! Fixed-capacity wire buffer
//!
//! One buffer holds a frame for its whole life: it is filled either by the
//! encoder or straight from the channel, and received frames are unstuffed
//! in place, so no second allocation is ever needed.

use heapless::Vec;

/// Largest data field a frame can carry (LEN is one byte)
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Worst-case wire size: two flags plus every logical byte escaped
///
/// Logical bytes are ADDR, CMD, STATE, LEN, CHK and the data field.
pub const MAX_WIRE_FRAME_SIZE: usize = 2 + (5 + MAX_PAYLOAD_SIZE) * 2;

/// Bounds-checked frame storage with a logical length
#[derive(Clone, PartialEq, Eq)]
pub struct WireBuffer {
    bytes: Vec<u8, MAX_WIRE_FRAME_SIZE>,
}

impl Default for WireBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "WireBuffer({:02x?})", self.as_slice())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WireBuffer {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "WireBuffer({=[u8]:x})", self.as_slice())
    }
}

impl WireBuffer {
    /// Empty buffer
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Copy raw bytes into a new buffer
    ///
    /// Returns `None` if `bytes` exceeds [`MAX_WIRE_FRAME_SIZE`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut buffer = Self::new();
        buffer.bytes.extend_from_slice(bytes).ok()?;
        Some(buffer)
    }

    /// Current contents
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Total capacity in bytes
    pub const fn capacity(&self) -> usize {
        MAX_WIRE_FRAME_SIZE
    }

    /// Append one byte, failing when full
    pub(crate) fn push(&mut self, byte: u8) -> Result<(), u8> {
        self.bytes.push(byte)
    }

    /// Mutable view of the valid bytes
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Shrink the logical length to `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Let `fill` write into the whole capacity, keep what it reports
    ///
    /// `fill` returns how many bytes it produced; anything past the
    /// capacity is ignored.
    pub(crate) fn fill_with<E>(
        &mut self,
        fill: impl FnOnce(&mut [u8]) -> Result<usize, E>,
    ) -> Result<usize, E> {
        self.bytes.clear();
        // Cannot fail: resizing an empty Vec up to its own capacity
        let _ = self.bytes.resize(MAX_WIRE_FRAME_SIZE, 0);
        match fill(self.bytes.as_mut_slice()) {
            Ok(n) => {
                let n = n.min(MAX_WIRE_FRAME_SIZE);
                self.bytes.truncate(n);
                Ok(n)
            }
            Err(e) => {
                self.bytes.clear();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_worst_case() {
        assert_eq!(MAX_WIRE_FRAME_SIZE, 522);
        assert_eq!(WireBuffer::new().capacity(), 522);
    }

    #[test]
    fn test_from_slice_rejects_oversize() {
        let big = [0u8; MAX_WIRE_FRAME_SIZE + 1];
        assert!(WireBuffer::from_slice(&big).is_none());
        assert_eq!(
            WireBuffer::from_slice(&big[..MAX_WIRE_FRAME_SIZE]).map(|b| b.len()),
            Some(MAX_WIRE_FRAME_SIZE)
        );
    }

    #[test]
    fn test_fill_with_keeps_reported_length() {
        let mut buffer = WireBuffer::new();
        let n = buffer
            .fill_with(|raw| {
                assert_eq!(raw.len(), MAX_WIRE_FRAME_SIZE);
                raw[..3].copy_from_slice(&[1, 2, 3]);
                Ok::<usize, ()>(3)
            })
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_fill_with_error_leaves_buffer_empty() {
        let mut buffer = WireBuffer::from_slice(&[9, 9]).unwrap();
        let result = buffer.fill_with(|_| Err::<usize, _>("boom"));

        assert_eq!(result, Err("boom"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_until_full() {
        let mut buffer = WireBuffer::new();
        for i in 0..MAX_WIRE_FRAME_SIZE {
            assert!(buffer.push(i as u8).is_ok());
        }
        assert_eq!(buffer.push(0xAB), Err(0xAB));
    }
}
