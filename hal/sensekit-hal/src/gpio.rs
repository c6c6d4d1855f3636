//! GPIO pin abstractions
//!
//! Drivers only ever drive pins (SPI chip select lines), so only the output
//! side is modelled here.

/// Digital output pin
pub trait OutputPin {
    /// Drive the pin high (logic 1)
    fn set_high(&mut self);

    /// Drive the pin low (logic 0)
    fn set_low(&mut self);

    /// Drive the pin to a specific level
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently driven high
    fn is_set_high(&self) -> bool;
}

/// Active-low chip select line
///
/// Wraps an [`OutputPin`] and deasserts it (drives it high) on creation so
/// the peripheral starts out deselected.
pub struct ChipSelect<P> {
    pin: P,
}

impl<P: OutputPin> ChipSelect<P> {
    /// Take ownership of `pin` and deselect the device
    pub fn new(mut pin: P) -> Self {
        pin.set_high();
        Self { pin }
    }

    /// Pull the line low to start a transaction
    pub fn select(&mut self) {
        self.pin.set_low();
    }

    /// Release the line at the end of a transaction
    pub fn deselect(&mut self) {
        self.pin.set_high();
    }

    /// Whether a transaction is currently open
    pub fn is_selected(&self) -> bool {
        !self.pin.is_set_high()
    }

    /// Give the pin back
    pub fn release(self) -> P {
        self.pin
    }
}
