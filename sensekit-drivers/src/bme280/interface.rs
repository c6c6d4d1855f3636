//! Register access over I2C or SPI

use sensekit_hal::{ChipSelect, I2cBus, OutputPin, SpiBus};

/// Byte-wide register file access
pub trait RegisterInterface {
    type Error;

    /// Read consecutive registers starting at `start`
    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write a single register
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error>;

    /// Read a single register
    fn read_register(&mut self, register: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8];
        self.read_registers(register, &mut value)?;
        Ok(value[0])
    }
}

/// I2C address with SDO tied to GND
pub const PRIMARY_ADDRESS: u8 = 0x76;
/// I2C address with SDO tied to VDDIO
pub const SECONDARY_ADDRESS: u8 = 0x77;

/// Registers over I2C: pointer write, repeated start, read
pub struct I2cInterface<B> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> I2cInterface<B> {
    /// Use the sensor at `address` on `bus`
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    /// Give the bus back
    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: I2cBus> RegisterInterface for I2cInterface<B> {
    type Error = B::Error;

    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<(), B::Error> {
        self.bus.write_read(self.address, &[start], buf)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), B::Error> {
        self.bus.write(self.address, &[register, value])
    }
}

/// Registers over 4-wire SPI
///
/// Bit 7 of the address byte selects the direction: set for reads, clear
/// for writes. Reads auto-increment for as long as chip select stays low.
pub struct SpiInterface<S, P> {
    spi: S,
    cs: ChipSelect<P>,
}

impl<S: SpiBus, P: OutputPin> SpiInterface<S, P> {
    /// Takes the chip select pin and deselects the device
    pub fn new(spi: S, cs: P) -> Self {
        Self {
            spi,
            cs: ChipSelect::new(cs),
        }
    }

    /// Give the bus and chip select pin back
    pub fn release(self) -> (S, P) {
        (self.spi, self.cs.release())
    }
}

impl<S: SpiBus, P: OutputPin> RegisterInterface for SpiInterface<S, P> {
    type Error = S::Error;

    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<(), S::Error> {
        self.cs.select();
        let result = match self.spi.write(&[start | 0x80]) {
            Ok(()) => self.spi.read(buf),
            Err(e) => Err(e),
        };
        self.cs.deselect();
        result
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), S::Error> {
        self.cs.select();
        let result = self.spi.write(&[register & 0x7F, value]);
        self.cs.deselect();
        result
    }
}
