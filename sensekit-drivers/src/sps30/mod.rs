//! Sensirion SPS30 particulate matter sensor
//!
//! The sensor speaks two interfaces with the same feature set:
//!
//! - [`Sps30Uart`]: SHDLC frames at 115200 8N1 (see `sensekit-protocol`)
//! - [`Sps30I2c`]: 16-bit commands, data in 2-byte words each followed by
//!   a CRC-8
//!
//! Both return the same data types, decoded explicitly from big-endian
//! wire bytes.

mod i2c;
mod uart;

pub use i2c::{crc8, Sps30I2c, I2C_ADDRESS};
pub use uart::{Sps30Uart, SHDLC_ADDRESS};

use heapless::String;
use sensekit_protocol::{ShdlcError, TransportError};

/// Length of the serial number field
pub const SERIAL_NUMBER_LEN: usize = 32;

/// Errors from SPS30 commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sps30Error {
    /// SHDLC exchange failed (UART)
    Link(ShdlcError),
    /// I2C transaction failed
    Bus,
    /// I2C word CRC mismatch
    Crc,
    /// Reply did not have the expected length or content
    InvalidResponse,
    /// Sensor refused the command; carries the SHDLC state byte
    UnsupportedCommand(u8),
    /// Firmware too old for this command
    FirmwareTooOld,
}

impl From<ShdlcError> for Sps30Error {
    fn from(error: ShdlcError) -> Self {
        match error {
            ShdlcError::UnsupportedCommand(state) => Sps30Error::UnsupportedCommand(state),
            other => Sps30Error::Link(other),
        }
    }
}

impl From<TransportError> for Sps30Error {
    fn from(error: TransportError) -> Self {
        Sps30Error::Link(ShdlcError::Transport(error))
    }
}

/// Measurement output format, chosen when starting a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputFormat {
    /// IEEE754 big-endian floats (40 bytes per reading)
    #[default]
    Float,
    /// Unsigned 16-bit integers (20 bytes per reading, firmware >= 2.0)
    Integer,
}

impl OutputFormat {
    /// Size of one reading in this format
    pub const fn reading_len(self) -> usize {
        match self {
            OutputFormat::Float => 40,
            OutputFormat::Integer => 20,
        }
    }

    /// Format selector byte used by both interfaces
    pub(crate) const fn selector(self) -> u8 {
        match self {
            OutputFormat::Float => 0x03,
            OutputFormat::Integer => 0x05,
        }
    }
}

/// One reading, generic over the output format's number type
///
/// Mass concentrations in µg/m³, number concentrations in #/cm³, typical
/// particle size in µm (float) or nm (integer).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Concentrations<T> {
    pub mc_1p0: T,
    pub mc_2p5: T,
    pub mc_4p0: T,
    pub mc_10p0: T,
    pub nc_0p5: T,
    pub nc_1p0: T,
    pub nc_2p5: T,
    pub nc_4p0: T,
    pub nc_10p0: T,
    pub typical_particle_size: T,
}

impl<T: Copy> Concentrations<T> {
    fn from_fields(f: [T; 10]) -> Self {
        Self {
            mc_1p0: f[0],
            mc_2p5: f[1],
            mc_4p0: f[2],
            mc_10p0: f[3],
            nc_0p5: f[4],
            nc_1p0: f[5],
            nc_2p5: f[6],
            nc_4p0: f[7],
            nc_10p0: f[8],
            typical_particle_size: f[9],
        }
    }
}

/// A decoded reading in whichever format the sensor was started with
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Measurement {
    Float(Concentrations<f32>),
    Integer(Concentrations<u16>),
}

impl Measurement {
    /// Decode a reading; the format follows from the length
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            40 => {
                let mut fields = [0f32; 10];
                for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
                    *field = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
                Some(Measurement::Float(Concentrations::from_fields(fields)))
            }
            20 => {
                let mut fields = [0u16; 10];
                for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(2)) {
                    *field = u16::from_be_bytes([chunk[0], chunk[1]]);
                }
                Some(Measurement::Integer(Concentrations::from_fields(fields)))
            }
            _ => None,
        }
    }

    /// Format this reading was taken in
    pub fn format(&self) -> OutputFormat {
        match self {
            Measurement::Float(_) => OutputFormat::Float,
            Measurement::Integer(_) => OutputFormat::Integer,
        }
    }
}

/// SHDLC-only part of the version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShdlcInfo {
    pub hardware_revision: u8,
    pub shdlc_major: u8,
    pub shdlc_minor: u8,
}

/// Firmware (and, over UART, hardware and protocol) versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionInfo {
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub shdlc: Option<ShdlcInfo>,
}

impl VersionInfo {
    /// Whether the firmware is at least `major.minor`
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.firmware_major, self.firmware_minor) >= (major, minor)
    }
}

/// Decode a NUL-terminated ASCII serial number
pub(crate) fn parse_serial(bytes: &[u8]) -> Result<String<SERIAL_NUMBER_LEN>, Sps30Error> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = core::str::from_utf8(&bytes[..end]).map_err(|_| Sps30Error::InvalidResponse)?;
    let mut serial = String::new();
    serial
        .push_str(text)
        .map_err(|_| Sps30Error::InvalidResponse)?;
    Ok(serial)
}

/// Parsed device status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStatus {
    /// Fan speed out of range (warning)
    pub fan_speed_warning: bool,
    /// Laser current out of range
    pub laser_failure: bool,
    /// Fan stopped or blocked
    pub fan_failure: bool,
}

impl DeviceStatus {
    /// Parse from the raw 32-bit register value
    pub fn from_register(value: u32) -> Self {
        Self {
            fan_speed_warning: (value & (1 << 21)) != 0,
            laser_failure: (value & (1 << 5)) != 0,
            fan_failure: (value & (1 << 4)) != 0,
        }
    }

    /// Check if any fault condition is present
    pub fn has_fault(&self) -> bool {
        self.laser_failure || self.fan_failure
    }
}
