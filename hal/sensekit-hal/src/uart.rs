//! UART serial communication abstractions
//!
//! Two layers live here. [`UartTx`]/[`UartRx`] are what a chip HAL
//! implements: a transmitter and a non-blocking byte receiver.
//! [`ByteStream`] is what frame-oriented protocols consume: whole-buffer
//! writes and a blocking "read until delimiter" with a timeout.
//! [`PacketUart`] builds the latter from the former plus a [`Clock`].

use crate::time::Clock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// UART transmitter
pub trait UartTx {
    /// Error type for transmit operations
    type Error: embedded_io::Error;

    /// Queue `data` for transmission
    ///
    /// Returns how many bytes were accepted. Fewer than `data.len()` means
    /// the transmitter could not take the rest.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Block until everything queued has left the shift register
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// UART receiver
pub trait UartRx {
    /// Error type for receive operations
    type Error: embedded_io::Error;

    /// Take one byte from the receive FIFO, if one is waiting
    fn try_read_byte(&mut self) -> Result<Option<u8>, Self::Error>;
}

/// Byte channel with frame-boundary reads
pub trait ByteStream {
    /// Error type for channel operations
    type Error: embedded_io::Error;

    /// Write `data`, returning the number of bytes actually written
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read one delimited frame into `buf`
    ///
    /// Returns once the closing `delimiter` has been stored, `buf` is full,
    /// or `timeout_ms` has elapsed. On timeout the bytes gathered so far are
    /// returned (possibly none); it is up to the caller to reject them.
    fn read_until(
        &mut self,
        delimiter: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, Self::Error>;
}

impl<T: ByteStream + ?Sized> ByteStream for &mut T {
    type Error = T::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(data)
    }

    fn read_until(
        &mut self,
        delimiter: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, Self::Error> {
        (**self).read_until(delimiter, buf, timeout_ms)
    }
}

/// [`ByteStream`] over a polled UART
///
/// `read_until` is a busy-polling loop against a deadline taken once on
/// entry. Bytes arriving before the opening delimiter are line noise and
/// are dropped. A delimiter straight after the opening one is treated as
/// the start of a new frame (the previous frame's closing flag followed by
/// the next frame's opening flag).
pub struct PacketUart<U, C> {
    uart: U,
    clock: C,
}

impl<U, C> PacketUart<U, C>
where
    U: UartTx + UartRx<Error = <U as UartTx>::Error>,
    C: Clock,
{
    /// Wrap a UART and the clock used for receive timeouts
    pub fn new(uart: U, clock: C) -> Self {
        Self { uart, clock }
    }

    /// Access the underlying UART
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// Take the UART and clock back
    pub fn release(self) -> (U, C) {
        (self.uart, self.clock)
    }
}

impl<U, C> ByteStream for PacketUart<U, C>
where
    U: UartTx + UartRx<Error = <U as UartTx>::Error>,
    C: Clock,
{
    type Error = <U as UartTx>::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let written = UartTx::write(&mut self.uart, data)?;
        self.uart.flush()?;
        Ok(written)
    }

    fn read_until(
        &mut self,
        delimiter: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize, Self::Error> {
        let deadline = self.clock.deadline(timeout_ms);
        let mut count = 0;

        while count < buf.len() {
            if let Some(byte) = self.uart.try_read_byte()? {
                let is_delimiter = byte == delimiter;
                match count {
                    // Waiting for the opening delimiter
                    0 if !is_delimiter => {}
                    // Back-to-back delimiters: the latest one opens the frame
                    1 if is_delimiter => {}
                    _ => {
                        buf[count] = byte;
                        count += 1;
                        if is_delimiter && count > 1 {
                            return Ok(count);
                        }
                    }
                }
            }

            if self.clock.expired(deadline) {
                break;
            }
        }

        Ok(count)
    }
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    /// 115200 8N1, the SPS30 line settings
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopBits {
    One,
    Two,
}
