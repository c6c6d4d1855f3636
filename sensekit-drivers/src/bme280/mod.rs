//! Bosch BME280 / BMP280 environmental sensor
//!
//! Both chips share the register map; the BMP280 lacks the humidity
//! channel. The driver detects which one is fitted from the chip ID.
//!
//! # Startup
//!
//! 1. Read the chip ID (0x58 BMP280, 0x60 BME280)
//! 2. Soft reset, then poll the status register until the trimming
//!    parameters have been copied to the image registers (500 ms deadline)
//! 3. Read the trimming parameters
//! 4. Write filter/standby, humidity oversampling and temperature/pressure
//!    oversampling, leaving the sensor in sleep mode
//!
//! Readings come out in fixed point, as the compensation formulas produce
//! them. [`Measurement`] has float helpers.

mod calibration;
mod interface;

pub use calibration::Calibration;
pub use interface::{
    I2cInterface, RegisterInterface, SpiInterface, PRIMARY_ADDRESS, SECONDARY_ADDRESS,
};

use embedded_hal::delay::DelayNs;
use sensekit_hal::Clock;

use calibration::{H_BLOCK_LEN, TP_BLOCK_LEN};

/// BME280 register addresses
pub mod reg {
    /// Temperature and pressure trimming parameters (24 bytes)
    pub const CALIB_TP: u8 = 0x88;
    /// Humidity trimming parameter H1
    pub const CALIB_H1: u8 = 0xA1;
    /// Chip identification
    pub const CHIP_ID: u8 = 0xD0;
    /// Soft reset
    pub const RESET: u8 = 0xE0;
    /// Humidity trimming parameters H2..H6 (7 bytes)
    pub const CALIB_H2: u8 = 0xE1;
    /// Humidity oversampling
    pub const CTRL_HUM: u8 = 0xF2;
    /// Measuring / image update flags
    pub const STATUS: u8 = 0xF3;
    /// Temperature/pressure oversampling and mode
    pub const CTRL_MEAS: u8 = 0xF4;
    /// Standby time and IIR filter
    pub const CONFIG: u8 = 0xF5;
    /// Burst read start: pressure, temperature, humidity
    pub const DATA: u8 = 0xF7;
}

const BMP280_CHIP_ID: u8 = 0x58;
const BME280_CHIP_ID: u8 = 0x60;

/// Magic value written to the reset register
const RESET_COMMAND: u8 = 0xB6;

/// Trimming parameters are still being copied
const STATUS_IM_UPDATE: u8 = 1 << 0;
/// A conversion is running
const STATUS_MEASURING: u8 = 1 << 3;

const MODE_MASK: u8 = 0b11;

const RESET_TIMEOUT_MS: u32 = 500;
const RESET_POLL_INTERVAL_MS: u32 = 10;

/// Errors from the BME280 driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bme280Error {
    /// Register access failed
    Bus,
    /// Chip ID is neither BMP280 nor BME280
    UnknownChip(u8),
    /// Trimming parameters never finished loading after reset
    ResetTimeout,
    /// Measurement requested before [`Bme280::init`]
    NotInitialized,
}

/// Detected chip variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Chip {
    /// Temperature and pressure (ID 0x58)
    Bmp280,
    /// Temperature, pressure and humidity (ID 0x60)
    Bme280,
}

impl Chip {
    /// Map a chip ID register value to a variant
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            BMP280_CHIP_ID => Some(Chip::Bmp280),
            BME280_CHIP_ID => Some(Chip::Bme280),
            _ => None,
        }
    }

    /// Whether the chip has a humidity channel
    pub fn has_humidity(self) -> bool {
        self == Chip::Bme280
    }
}

/// Power mode (ctrl_meas bits 1:0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    Sleep = 0,
    /// One conversion, then back to sleep
    Forced = 1,
    /// Continuous conversions separated by the standby time
    Normal = 3,
}

/// IIR filter coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Filter {
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    #[default]
    X16 = 4,
}

/// Oversampling setting for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Oversampling {
    /// Channel disabled
    Skip = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    #[default]
    X16 = 5,
}

/// Standby time between conversions in normal mode
///
/// The two longest settings differ between the chips: 2 s / 4 s on the
/// BMP280, 10 ms / 20 ms on the BME280.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    #[default]
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Bmp2000Bme10 = 6,
    Bmp4000Bme20 = 7,
}

/// BME280 configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bme280Config {
    pub filter: Filter,
    pub pressure_oversampling: Oversampling,
    pub temperature_oversampling: Oversampling,
    /// Ignored on the BMP280
    pub humidity_oversampling: Oversampling,
    pub standby: Standby,
}

impl Bme280Config {
    fn config_register(&self) -> u8 {
        ((self.standby as u8) << 5) | ((self.filter as u8) << 2)
    }

    fn ctrl_meas_register(&self, mode: Mode) -> u8 {
        ((self.temperature_oversampling as u8) << 5)
            | ((self.pressure_oversampling as u8) << 2)
            | mode as u8
    }
}

/// One compensated reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Temperature in 0.01 °C
    pub temperature: i32,
    /// Pressure in Pa, Q24.8
    pub pressure: u32,
    /// Relative humidity in %, Q22.10 (BME280 only)
    pub humidity: Option<u32>,
}

impl Measurement {
    /// Temperature in °C
    pub fn temperature_celsius(&self) -> f32 {
        self.temperature as f32 / 100.0
    }

    /// Pressure in Pa
    pub fn pressure_pa(&self) -> f32 {
        self.pressure as f32 / 256.0
    }

    /// Relative humidity in %
    pub fn humidity_percent(&self) -> Option<f32> {
        self.humidity.map(|h| h as f32 / 1024.0)
    }
}

/// BME280 / BMP280 driver
pub struct Bme280<I, D, C> {
    interface: I,
    delay: D,
    clock: C,
    config: Bme280Config,
    chip: Option<Chip>,
    calibration: Calibration,
}

impl<I, D, C> Bme280<I, D, C>
where
    I: RegisterInterface,
    D: DelayNs,
    C: Clock,
{
    /// Create a driver; call [`init`](Self::init) before measuring
    pub fn new(interface: I, delay: D, clock: C, config: Bme280Config) -> Self {
        Self {
            interface,
            delay,
            clock,
            config,
            chip: None,
            calibration: Calibration::default(),
        }
    }

    /// Chip detected by [`init`](Self::init)
    pub fn chip(&self) -> Option<Chip> {
        self.chip
    }

    /// Trimming parameters read by [`init`](Self::init)
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Take the interface, delay and clock back
    pub fn release(self) -> (I, D, C) {
        (self.interface, self.delay, self.clock)
    }

    /// Detect, reset and configure the sensor
    ///
    /// Leaves it in sleep mode; start conversions with
    /// [`start_measurement`](Self::start_measurement).
    pub fn init(&mut self) -> Result<Chip, Bme280Error> {
        debug!("Initializing BME280");
        self.chip = None;

        let id = self.read(reg::CHIP_ID)?;
        let chip = Chip::from_id(id).ok_or(Bme280Error::UnknownChip(id))?;
        debug!("BME280 chip id {=u8:#x}", id);

        self.reset()?;
        self.wait_for_trimming()?;
        self.read_calibration(chip)?;

        self.write(reg::CONFIG, self.config.config_register())?;
        if chip.has_humidity() {
            // ctrl_hum only takes effect after the next ctrl_meas write
            self.write(reg::CTRL_HUM, self.config.humidity_oversampling as u8)?;
        }
        self.write(reg::CTRL_MEAS, self.config.ctrl_meas_register(Mode::Sleep))?;

        self.chip = Some(chip);
        Ok(chip)
    }

    /// Soft reset
    pub fn reset(&mut self) -> Result<(), Bme280Error> {
        self.write(reg::RESET, RESET_COMMAND)
    }

    /// Start conversions: continuous (normal mode) or a single one (forced)
    pub fn start_measurement(&mut self, continuous: bool) -> Result<(), Bme280Error> {
        self.set_mode(if continuous { Mode::Normal } else { Mode::Forced })
    }

    /// Go to sleep mode
    pub fn stop_measurement(&mut self) -> Result<(), Bme280Error> {
        self.set_mode(Mode::Sleep)
    }

    /// Whether a conversion is running or a forced one is still pending
    pub fn is_measuring(&mut self) -> Result<bool, Bme280Error> {
        if self.read(reg::STATUS)? & STATUS_MEASURING != 0 {
            return Ok(true);
        }
        Ok(self.read(reg::CTRL_MEAS)? & MODE_MASK == Mode::Forced as u8)
    }

    /// Read and compensate the latest conversion
    pub fn read_measurement(&mut self) -> Result<Measurement, Bme280Error> {
        let chip = self.chip.ok_or(Bme280Error::NotInitialized)?;

        let mut data = [0u8; 8];
        let len = if chip.has_humidity() { 8 } else { 6 };
        self.interface
            .read_registers(reg::DATA, &mut data[..len])
            .map_err(|_| Bme280Error::Bus)?;

        let adc_p = ((data[0] as i32) << 12) | ((data[1] as i32) << 4) | (data[2] as i32 >> 4);
        let adc_t = ((data[3] as i32) << 12) | ((data[4] as i32) << 4) | (data[5] as i32 >> 4);
        trace!("BME280 raw T={} P={}", adc_t, adc_p);

        let t_fine = self.calibration.fine_temperature(adc_t);
        let humidity = chip.has_humidity().then(|| {
            let adc_h = ((data[6] as i32) << 8) | data[7] as i32;
            self.calibration.humidity(adc_h, t_fine)
        });

        Ok(Measurement {
            temperature: Calibration::temperature(t_fine),
            pressure: self.calibration.pressure(adc_p, t_fine),
            humidity,
        })
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), Bme280Error> {
        let ctrl = self.read(reg::CTRL_MEAS)?;
        self.write(reg::CTRL_MEAS, (ctrl & !MODE_MASK) | mode as u8)
    }

    fn wait_for_trimming(&mut self) -> Result<(), Bme280Error> {
        let deadline = self.clock.deadline(RESET_TIMEOUT_MS);
        loop {
            // The chip may NACK while it reboots
            if let Ok(status) = self.interface.read_register(reg::STATUS) {
                if status & STATUS_IM_UPDATE == 0 {
                    return Ok(());
                }
            }
            if self.clock.expired(deadline) {
                warn!("BME280 did not finish reset within {} ms", RESET_TIMEOUT_MS);
                return Err(Bme280Error::ResetTimeout);
            }
            self.delay.delay_ms(RESET_POLL_INTERVAL_MS);
        }
    }

    fn read_calibration(&mut self, chip: Chip) -> Result<(), Bme280Error> {
        let mut tp = [0u8; TP_BLOCK_LEN];
        self.interface
            .read_registers(reg::CALIB_TP, &mut tp)
            .map_err(|_| Bme280Error::Bus)?;
        let mut calibration = Calibration::from_tp_block(&tp);

        if chip.has_humidity() {
            let h1 = self.read(reg::CALIB_H1)?;
            let mut h = [0u8; H_BLOCK_LEN];
            self.interface
                .read_registers(reg::CALIB_H2, &mut h)
                .map_err(|_| Bme280Error::Bus)?;
            calibration = calibration.with_humidity(h1, &h);
        }

        self.calibration = calibration;
        Ok(())
    }

    fn read(&mut self, register: u8) -> Result<u8, Bme280Error> {
        self.interface
            .read_register(register)
            .map_err(|_| Bme280Error::Bus)
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), Bme280Error> {
        self.interface
            .write_register(register, value)
            .map_err(|_| Bme280Error::Bus)
    }
}
