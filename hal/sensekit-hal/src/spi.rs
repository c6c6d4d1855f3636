//! SPI bus abstractions
//!
//! Chip select is not part of the bus; drivers own a
//! [`ChipSelect`](crate::gpio::ChipSelect) and frame transactions themselves.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// SPI bus master
pub trait SpiBus {
    /// Error type for SPI operations
    type Error;

    /// Write data, discarding whatever is clocked in
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read data while clocking out zeros
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Full-duplex transfer in place
    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), Self::Error>;
}

/// SPI mode (combined clock polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// Clock idles high (CPOL=1)
    pub fn idle_high(self) -> bool {
        matches!(self, Mode::Mode2 | Mode::Mode3)
    }

    /// Data captured on the second clock edge (CPHA=1)
    pub fn capture_on_second_edge(self) -> bool {
        matches!(self, Mode::Mode1 | Mode::Mode3)
    }
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// Clock polarity and phase
    pub mode: Mode,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000, // 1 MHz
            mode: Mode::Mode0,
        }
    }
}
