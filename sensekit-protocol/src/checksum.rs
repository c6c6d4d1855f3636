//! SHDLC checksum
//!
//! The checksum is the bitwise inverse of the low byte of the sum of every
//! logical (unescaped) byte it protects: address, command, state (responses
//! only), length and data.

/// Checksum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    let mut acc = Checksum::new();
    acc.update_all(bytes);
    acc.finish()
}

/// Running checksum, fed one logical byte at a time while a frame is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u8,
}

impl Checksum {
    /// Start an empty sum
    pub const fn new() -> Self {
        Self { sum: 0 }
    }

    /// Add one byte
    pub fn update(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(byte);
    }

    /// Add a run of bytes
    pub fn update_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    /// Final checksum value
    pub fn finish(self) -> u8 {
        !self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0xFF);
    }

    #[test]
    fn test_checksum_wake_up_command() {
        // addr 0x00, cmd 0x11, len 0x00
        assert_eq!(checksum(&[0x00, 0x11, 0x00]), 0xEE);
    }

    #[test]
    fn test_checksum_wraps() {
        // 0xFF + 0x02 = 0x101 -> 0x01 -> !0x01 = 0xFE
        assert_eq!(checksum(&[0xFF, 0x02]), 0xFE);
    }

    #[test]
    fn test_checksum_start_measurement() {
        // Sensirion datasheet example: start measurement, float output
        // 7E 00 00 02 01 03 F9 7E
        assert_eq!(checksum(&[0x00, 0x00, 0x02, 0x01, 0x03]), 0xF9);
    }

    #[test]
    fn test_accumulator_matches_one_shot() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        let mut acc = Checksum::new();
        for &b in &data {
            acc.update(b);
        }
        assert_eq!(acc.finish(), checksum(&data));
    }
}
