//! Factory trimming parameters and fixed-point compensation
//!
//! The formulas are the integer reference implementations from the Bosch
//! datasheet. Parameters are decoded one field at a time from their
//! register offsets; all of them are little-endian.

/// Size of the temperature/pressure block at 0x88
pub const TP_BLOCK_LEN: usize = 24;
/// Size of the humidity block at 0xE1
pub const H_BLOCK_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_i16(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

impl Calibration {
    /// Decode the temperature and pressure parameters (0x88..0x9F)
    pub fn from_tp_block(block: &[u8; TP_BLOCK_LEN]) -> Self {
        Self {
            t1: le_u16(block, 0),
            t2: le_i16(block, 2),
            t3: le_i16(block, 4),
            p1: le_u16(block, 6),
            p2: le_i16(block, 8),
            p3: le_i16(block, 10),
            p4: le_i16(block, 12),
            p5: le_i16(block, 14),
            p6: le_i16(block, 16),
            p7: le_i16(block, 18),
            p8: le_i16(block, 20),
            p9: le_i16(block, 22),
            ..Self::default()
        }
    }

    /// Add the humidity parameters: H1 from 0xA1, the rest from 0xE1..0xE7
    ///
    /// H4 and H5 are 12-bit signed values sharing the nibbles of 0xE5.
    pub fn with_humidity(self, h1: u8, block: &[u8; H_BLOCK_LEN]) -> Self {
        Self {
            h1,
            h2: le_i16(block, 0),
            h3: block[2],
            h4: ((block[3] as i8 as i16) << 4) | (block[4] & 0x0F) as i16,
            h5: ((block[5] as i8 as i16) << 4) | (block[4] >> 4) as i16,
            h6: block[6] as i8,
            ..self
        }
    }

    /// Fine temperature, the shared input of every other compensation
    ///
    /// Evaluated in `i64` and saturated, so any raw value and any trimming
    /// block give a result.
    pub fn fine_temperature(&self, adc_t: i32) -> i32 {
        let adc_t = adc_t as i64;
        let t1 = self.t1 as i64;
        let var1 = (((adc_t >> 3) - (t1 << 1)) * self.t2 as i64) >> 11;
        let d = (adc_t >> 4) - t1;
        let var2 = (((d * d) >> 12) * self.t3 as i64) >> 14;
        (var1 + var2).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// Temperature in 0.01 °C
    pub fn temperature(t_fine: i32) -> i32 {
        // |t_fine * 5 / 256| < 2^31 for every i32
        ((t_fine as i64 * 5 + 128) >> 8) as i32
    }

    /// Pressure in Pa as Q24.8
    ///
    /// 0 when the trimming parameters give no usable result (division by
    /// zero or overflow).
    pub fn pressure(&self, adc_p: i32, t_fine: i32) -> u32 {
        self.pressure_i64(adc_p as i64, t_fine as i64)
            .map_or(0, |p| p.clamp(0, u32::MAX as i64) as u32)
    }

    fn pressure_i64(&self, adc_p: i64, t_fine: i64) -> Option<i64> {
        let var1 = t_fine - 128_000;
        let square = var1.checked_mul(var1)?;
        let var2 = square
            .checked_mul(self.p6 as i64)?
            .checked_add(var1.checked_mul(self.p5 as i64)?.checked_mul(1 << 17)?)?
            .checked_add((self.p4 as i64) << 35)?;
        let var1 = (square.checked_mul(self.p3 as i64)? >> 8)
            .checked_add(var1.checked_mul(self.p2 as i64)?.checked_mul(1 << 12)?)?;
        let var1 = (1i64 << 47).checked_add(var1)?.checked_mul(self.p1 as i64)? >> 33;
        if var1 == 0 {
            return None;
        }

        let p = (1_048_576 - adc_p)
            .checked_mul(1 << 31)?
            .checked_sub(var2)?
            .checked_mul(3125)?
            .checked_div(var1)?;
        let var1 = (self.p9 as i64).checked_mul(p >> 13)?.checked_mul(p >> 13)? >> 25;
        let var2 = (self.p8 as i64).checked_mul(p)? >> 19;
        Some((p.checked_add(var1)?.checked_add(var2)? >> 8) + ((self.p7 as i64) << 4))
    }

    /// Relative humidity in % as Q22.10
    ///
    /// 0 when the trimming parameters overflow the computation.
    pub fn humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        self.humidity_i64(adc_h as i64, t_fine as i64)
            .map_or(0, |h| (h.clamp(0, 419_430_400) >> 12) as u32)
    }

    fn humidity_i64(&self, adc_h: i64, t_fine: i64) -> Option<i64> {
        let v = t_fine - 76_800;
        let offset =
            ((adc_h << 14) - ((self.h4 as i64) << 20) - self.h5 as i64 * v + 16_384) >> 15;
        let scale = ((((v * self.h6 as i64) >> 10) * (((v * self.h3 as i64) >> 11) + 32_768))
            >> 10)
            + 2_097_152;
        let scale = scale.checked_mul(self.h2 as i64)?.checked_add(8_192)? >> 14;
        let v = offset.checked_mul(scale)?;
        let square = (v >> 15).checked_mul(v >> 15)?;
        v.checked_sub((square >> 7).checked_mul(self.h1 as i64)? >> 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TP_BLOCK: [u8; TP_BLOCK_LEN] = [
        0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
        0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17,
    ];
    const H_BLOCK: [u8; H_BLOCK_LEN] = [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 30];

    fn calibration() -> Calibration {
        Calibration::from_tp_block(&TP_BLOCK).with_humidity(75, &H_BLOCK)
    }

    #[test]
    fn test_decode_fields() {
        let cal = calibration();
        assert_eq!(cal.t1, 27504);
        assert_eq!(cal.t2, 26435);
        assert_eq!(cal.t3, -1000);
        assert_eq!(cal.p1, 36477);
        assert_eq!(cal.p2, -10685);
        assert_eq!(cal.p6, -7);
        assert_eq!(cal.p8, -14600);
        assert_eq!(cal.p9, 6000);
        assert_eq!(cal.h1, 75);
        assert_eq!(cal.h2, 362);
        assert_eq!(cal.h3, 0);
        assert_eq!(cal.h4, 313);
        assert_eq!(cal.h5, 50);
        assert_eq!(cal.h6, 30);
    }

    #[test]
    fn test_humidity_nibbles_sign_extend() {
        // H4 = 0xF8 << 4 | 0x1 -> -127, H5 = 0x80 << 4 | 0xF -> -2033
        let cal = Calibration::default().with_humidity(0, &[0, 0, 0, 0xF8, 0xF1, 0x80, 0xFF]);
        assert_eq!(cal.h4, -127);
        assert_eq!(cal.h5, -2033);
        assert_eq!(cal.h6, -1);
    }

    #[test]
    fn test_temperature() {
        let cal = calibration();
        let t_fine = cal.fine_temperature(519_888);
        assert_eq!(t_fine, 128_422);
        assert_eq!(Calibration::temperature(t_fine), 2508);
    }

    #[test]
    fn test_pressure() {
        let cal = calibration();
        assert_eq!(cal.pressure(415_148, 128_422), 25_767_233);
    }

    #[test]
    fn test_pressure_zero_p1() {
        let cal = Calibration::default();
        assert_eq!(cal.pressure(415_148, 128_422), 0);
    }

    #[test]
    fn test_humidity() {
        let cal = calibration();
        assert_eq!(cal.humidity(30_000, 128_422), 56_317);
    }

    #[test]
    fn test_humidity_clamps_low() {
        let cal = calibration();
        assert_eq!(cal.humidity(0, 128_422), 0);
    }

    #[test]
    fn test_degenerate_trimming_does_not_overflow() {
        let blank = Calibration::from_tp_block(&[0x00; TP_BLOCK_LEN])
            .with_humidity(0x00, &[0x00; H_BLOCK_LEN]);
        let erased = Calibration::from_tp_block(&[0xFF; TP_BLOCK_LEN])
            .with_humidity(0xFF, &[0xFF; H_BLOCK_LEN]);

        for cal in [blank, erased, calibration()] {
            for adc in [0, 0xF_FFFF, i32::MIN, i32::MAX] {
                let t_fine = cal.fine_temperature(adc);
                let _ = Calibration::temperature(t_fine);
                let _ = cal.pressure(adc, t_fine);
                let _ = cal.humidity(adc & 0xFFFF, t_fine);
                assert!(cal.humidity(adc, t_fine) <= 100 * 1024);
            }
        }
    }

    #[test]
    fn test_blank_trimming_values() {
        let blank = Calibration::from_tp_block(&[0x00; TP_BLOCK_LEN]);
        assert_eq!(blank.fine_temperature(0xF_FFFF), 0);
        // P1 = 0 would divide by zero
        assert_eq!(blank.pressure(0xF_FFFF, 0), 0);
    }

    #[test]
    fn test_extreme_fine_temperature() {
        let cal = calibration();
        assert_eq!(Calibration::temperature(i32::MAX), 41_943_040);
        assert_eq!(Calibration::temperature(i32::MIN), -41_943_040);
        let _ = cal.pressure(0, i32::MAX);
        let _ = cal.pressure(0xF_FFFF, i32::MIN);
        let _ = cal.humidity(0xFFFF, i32::MAX);
        let _ = cal.humidity(0, i32::MIN);
    }
}
