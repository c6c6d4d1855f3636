//! Sensor drivers
//!
//! - [`sps30`] - Sensirion SPS30 particulate matter sensor, over SHDLC/UART
//!   or I2C
//! - [`bme280`] - Bosch BME280/BMP280 temperature, pressure and humidity
//!   sensor, over I2C or SPI

#![no_std]
#![deny(unsafe_code)]

mod fmt;

pub mod bme280;
pub mod sps30;
