//! SPS30 over I2C
//!
//! Every command is a big-endian 16-bit code, optionally followed by
//! argument words. Data travels in 2-byte words, each followed by a CRC-8
//! over the word.

use embedded_hal::delay::DelayNs;
use heapless::String;
use sensekit_hal::I2cBus;

use super::{
    parse_serial, DeviceStatus, Measurement, OutputFormat, Sps30Error, VersionInfo,
    SERIAL_NUMBER_LEN,
};

/// Fixed I2C address of the SPS30
pub const I2C_ADDRESS: u8 = 0x69;

/// SPS30 I2C command codes
pub mod cmd {
    pub const START_MEASUREMENT: u16 = 0x0010;
    pub const STOP_MEASUREMENT: u16 = 0x0104;
    pub const READ_DATA_READY: u16 = 0x0202;
    pub const READ_MEASURED_VALUES: u16 = 0x0300;
    pub const SLEEP: u16 = 0x1001;
    pub const WAKE_UP: u16 = 0x1103;
    pub const START_FAN_CLEANING: u16 = 0x5607;
    pub const AUTO_CLEANING_INTERVAL: u16 = 0x8004;
    pub const READ_SERIAL_NUMBER: u16 = 0xD033;
    pub const READ_VERSION: u16 = 0xD100;
    pub const READ_DEVICE_STATUS: u16 = 0xD206;
    pub const CLEAR_DEVICE_STATUS: u16 = 0xD210;
    pub const RESET: u16 = 0xD304;
}

/// Settle time after start/stop measurement
const START_STOP_DELAY_MS: u32 = 20;
/// Settle time after most other commands
const COMMAND_DELAY_MS: u32 = 5;
/// Wait for the sensor to prepare the version word
const VERSION_DELAY_MS: u32 = 20;
/// Wait for the interval to be written to flash
const FLASH_WRITE_DELAY_MS: u32 = 20;
/// Reboot time after a soft reset
const RESET_DELAY_MS: u32 = 200;

/// Most argument words any command takes
const MAX_WRITE_WORDS: usize = 2;
/// Largest read: 40 bytes of float measurement as 20 words with CRC
const MAX_READ_LEN: usize = 60;

/// Sensirion CRC-8 (polynomial 0x31, init 0xFF) over one data word
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// SPS30 driver on an I2C bus
pub struct Sps30I2c<B, D> {
    bus: B,
    delay: D,
    version: Option<VersionInfo>,
    format: OutputFormat,
}

impl<B: I2cBus, D: DelayNs> Sps30I2c<B, D> {
    /// Create a driver; nothing is sent until the first command
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            version: None,
            format: OutputFormat::Float,
        }
    }

    /// Version read by the last successful version query
    pub fn cached_version(&self) -> Option<VersionInfo> {
        self.version
    }

    /// Format selected by the last [`start_measurement`](Self::start_measurement)
    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Take the bus and delay back
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Wake the sensor (if it sleeps) and read its firmware version
    pub fn probe(&mut self) -> Result<VersionInfo, Sps30Error> {
        debug!("SPS30 probe");
        if let Err(e) = self.wake_up() {
            debug!("SPS30 wake-up before probe failed: {}", e);
        }
        self.version()
    }

    /// Read the firmware version
    ///
    /// The I2C interface reports no hardware or SHDLC versions.
    pub fn version(&mut self) -> Result<VersionInfo, Sps30Error> {
        let mut data = [0u8; 2];
        self.read_words(cmd::READ_VERSION, VERSION_DELAY_MS, &mut data)?;
        let version = VersionInfo {
            firmware_major: data[0],
            firmware_minor: data[1],
            shdlc: None,
        };
        self.version = Some(version);
        Ok(version)
    }

    /// Read the serial number string
    pub fn serial_number(&mut self) -> Result<String<SERIAL_NUMBER_LEN>, Sps30Error> {
        let mut data = [0u8; SERIAL_NUMBER_LEN];
        self.read_words(cmd::READ_SERIAL_NUMBER, 0, &mut data)?;
        parse_serial(&data)
    }

    /// Start continuous measurement
    ///
    /// Integer output needs firmware 2.0 or newer.
    pub fn start_measurement(&mut self, format: OutputFormat) -> Result<(), Sps30Error> {
        if format == OutputFormat::Integer {
            self.require_firmware(2, 0)?;
        }
        self.write_words(
            cmd::START_MEASUREMENT,
            &[u16::from_be_bytes([format.selector(), 0x00])],
        )?;
        self.format = format;
        self.delay.delay_ms(START_STOP_DELAY_MS);
        Ok(())
    }

    /// Return to idle mode
    pub fn stop_measurement(&mut self) -> Result<(), Sps30Error> {
        self.send_command(cmd::STOP_MEASUREMENT)?;
        self.delay.delay_ms(START_STOP_DELAY_MS);
        Ok(())
    }

    /// Whether a new reading is waiting
    pub fn is_data_ready(&mut self) -> Result<bool, Sps30Error> {
        let mut data = [0u8; 2];
        self.read_words(cmd::READ_DATA_READY, 0, &mut data)?;
        Ok(u16::from_be_bytes(data) != 0)
    }

    /// Read the latest values in the format measurement was started with
    pub fn read_measurement(&mut self) -> Result<Measurement, Sps30Error> {
        let mut data = [0u8; 40];
        let len = self.format.reading_len();
        self.read_words(cmd::READ_MEASURED_VALUES, 0, &mut data[..len])?;
        Measurement::from_bytes(&data[..len]).ok_or(Sps30Error::InvalidResponse)
    }

    /// Read the fan auto-cleaning interval in seconds
    pub fn fan_auto_cleaning_interval(&mut self) -> Result<u32, Sps30Error> {
        let mut data = [0u8; 4];
        self.read_words(cmd::AUTO_CLEANING_INTERVAL, COMMAND_DELAY_MS, &mut data)?;
        Ok(u32::from_be_bytes(data))
    }

    /// Set the fan auto-cleaning interval in seconds (0 disables it)
    pub fn set_fan_auto_cleaning_interval(&mut self, seconds: u32) -> Result<(), Sps30Error> {
        self.write_words(
            cmd::AUTO_CLEANING_INTERVAL,
            &[(seconds >> 16) as u16, seconds as u16],
        )?;
        self.delay.delay_ms(FLASH_WRITE_DELAY_MS);
        Ok(())
    }

    /// Run the fan at full speed for a cleaning cycle
    pub fn start_fan_cleaning(&mut self) -> Result<(), Sps30Error> {
        self.send_command(cmd::START_FAN_CLEANING)?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        Ok(())
    }

    /// Soft reset, then wait for the sensor to reboot
    pub fn reset(&mut self) -> Result<(), Sps30Error> {
        self.send_command(cmd::RESET)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.version = None;
        self.format = OutputFormat::Float;
        Ok(())
    }

    /// Enter sleep mode (firmware 2.0+, only from idle)
    pub fn sleep(&mut self) -> Result<(), Sps30Error> {
        self.require_firmware(2, 0)?;
        self.send_command(cmd::SLEEP)?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        Ok(())
    }

    /// Leave sleep mode
    ///
    /// Refused only when the firmware is known to be older than 2.0; with
    /// an unknown version the attempt is made. A sleeping sensor ignores the
    /// first transfer (it only re-enables the interface), so the command
    /// goes out twice and only the second must be acknowledged.
    pub fn wake_up(&mut self) -> Result<(), Sps30Error> {
        if let Some(version) = self.version {
            if !version.at_least(2, 0) {
                return Err(Sps30Error::FirmwareTooOld);
            }
        }
        let _ = self.send_command(cmd::WAKE_UP);
        self.send_command(cmd::WAKE_UP)?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        Ok(())
    }

    /// Read the device status register (firmware 2.2+)
    pub fn device_status(&mut self) -> Result<DeviceStatus, Sps30Error> {
        self.require_firmware(2, 2)?;
        let mut data = [0u8; 4];
        self.read_words(cmd::READ_DEVICE_STATUS, COMMAND_DELAY_MS, &mut data)?;
        Ok(DeviceStatus::from_register(u32::from_be_bytes(data)))
    }

    /// Clear the device status register (firmware 2.0+)
    pub fn clear_device_status(&mut self) -> Result<(), Sps30Error> {
        self.require_firmware(2, 0)?;
        self.send_command(cmd::CLEAR_DEVICE_STATUS)?;
        self.delay.delay_ms(COMMAND_DELAY_MS);
        Ok(())
    }

    /// Fail with `FirmwareTooOld` unless firmware is at least `major.minor`
    fn require_firmware(&mut self, major: u8, minor: u8) -> Result<(), Sps30Error> {
        let version = match self.version {
            Some(version) => version,
            None => self.version()?,
        };
        if version.at_least(major, minor) {
            Ok(())
        } else {
            debug!(
                "SPS30 firmware {}.{} too old, need {}.{}",
                version.firmware_major,
                version.firmware_minor,
                major,
                minor
            );
            Err(Sps30Error::FirmwareTooOld)
        }
    }

    fn send_command(&mut self, command: u16) -> Result<(), Sps30Error> {
        trace!("SPS30 command {=u16:#x}", command);
        self.bus
            .write(I2C_ADDRESS, &command.to_be_bytes())
            .map_err(|_| Sps30Error::Bus)
    }

    /// Send a command followed by argument words, each with its CRC
    fn write_words(&mut self, command: u16, words: &[u16]) -> Result<(), Sps30Error> {
        let mut buf = [0u8; 2 + MAX_WRITE_WORDS * 3];
        buf[..2].copy_from_slice(&command.to_be_bytes());
        let mut len = 2;
        for word in words.iter().take(MAX_WRITE_WORDS) {
            let bytes = word.to_be_bytes();
            buf[len..len + 2].copy_from_slice(&bytes);
            buf[len + 2] = crc8(&bytes);
            len += 3;
        }

        trace!("SPS30 write {=[u8]:x}", &buf[..len]);
        self.bus
            .write(I2C_ADDRESS, &buf[..len])
            .map_err(|_| Sps30Error::Bus)
    }

    /// Send a command, wait `delay_ms`, then read `out.len()` data bytes
    ///
    /// `out.len()` must be even; each word is checked against its CRC.
    fn read_words(&mut self, command: u16, delay_ms: u32, out: &mut [u8]) -> Result<(), Sps30Error> {
        let raw_len = out.len() / 2 * 3;
        if out.len() % 2 != 0 || raw_len > MAX_READ_LEN {
            return Err(Sps30Error::InvalidResponse);
        }

        self.send_command(command)?;
        if delay_ms > 0 {
            self.delay.delay_ms(delay_ms);
        }

        let mut raw = [0u8; MAX_READ_LEN];
        let raw = &mut raw[..raw_len];
        self.bus
            .read(I2C_ADDRESS, raw)
            .map_err(|_| Sps30Error::Bus)?;
        trace!("SPS30 read {=[u8]:x}", &raw[..]);

        for (word, chunk) in out.chunks_exact_mut(2).zip(raw.chunks_exact(3)) {
            let crc = crc8(&chunk[..2]);
            if crc != chunk[2] {
                debug!(
                    "SPS30 CRC mismatch: computed {=u8:#x}, received {=u8:#x}",
                    crc,
                    chunk[2]
                );
                return Err(Sps30Error::Crc);
            }
            word.copy_from_slice(&chunk[..2]);
        }
        Ok(())
    }
}
