//! sensekit Hardware Abstraction Layer
//!
//! Traits the sensor drivers are written against, so the same driver code
//! runs on any board that can provide a serial port, an I2C or SPI master
//! and a millisecond tick.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  sensekit-drivers (SPS30, BME280)       │
//! └─────────────────────────────────────────┘
//!          │                      │
//!          ▼                      │
//! ┌──────────────────┐            │
//! │ sensekit-protocol│            │
//! │ (SHDLC session)  │            │
//! └──────────────────┘            │
//!          │                      │
//!          ▼                      ▼
//! ┌─────────────────────────────────────────┐
//! │  sensekit-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`] - Digital output (SPI chip select)
//! - [`uart::UartTx`], [`uart::UartRx`] - Non-blocking serial port
//! - [`uart::ByteStream`] - Frame-oriented byte channel used by SHDLC
//! - [`i2c::I2cBus`] - I2C bus operations
//! - [`spi::SpiBus`] - SPI bus operations
//! - [`time::Clock`] - Monotonic millisecond ticks

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod i2c;
pub mod spi;
pub mod time;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use gpio::{ChipSelect, OutputPin};
pub use i2c::I2cBus;
pub use spi::SpiBus;
pub use time::Clock;
pub use uart::{ByteStream, PacketUart, UartRx, UartTx};
