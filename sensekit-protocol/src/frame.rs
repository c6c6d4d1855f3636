//! SHDLC frame stuffing and unstuffing
//!
//! Logical frame layouts (before escaping):
//! - request (master → slave): `ADDR CMD LEN DATA.. CHK`
//! - response (slave → master): `ADDR CMD STATE LEN DATA.. CHK`
//!
//! On the wire the logical bytes are wrapped in [`DELIMITER`] flags, and
//! every logical byte that collides with a control value is replaced by
//! [`ESCAPE`] followed by the byte with bit 5 inverted.

use crate::buffer::{WireBuffer, MAX_PAYLOAD_SIZE};
use crate::checksum::{checksum, Checksum};

/// Start/stop flag
pub const DELIMITER: u8 = 0x7E;

/// Escape marker
pub const ESCAPE: u8 = 0x7D;

/// Smallest possible wire frame: two flags, ADDR, CMD, LEN, CHK
pub const MIN_WIRE_FRAME_SIZE: usize = 7;

/// Raw byte → escape code
static ESCAPE_TABLE: [(u8, u8); 4] = [(0x11, 0x31), (0x13, 0x33), (0x7D, 0x5D), (0x7E, 0x5E)];

/// Escape code for `raw`, or `None` if it goes on the wire as-is
pub fn escape_code(raw: u8) -> Option<u8> {
    ESCAPE_TABLE
        .iter()
        .find(|&&(byte, _)| byte == raw)
        .map(|&(_, code)| code)
}

/// Raw byte for an escape `code`, or `None` if the code is not defined
pub fn unescape_code(code: u8) -> Option<u8> {
    ESCAPE_TABLE
        .iter()
        .find(|&&(_, c)| c == code)
        .map(|&(byte, _)| byte)
}

/// Errors from stuffing or unstuffing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Data field longer than [`MAX_PAYLOAD_SIZE`]
    PayloadTooLarge,
    /// Fewer than [`MIN_WIRE_FRAME_SIZE`] bytes received
    TooShort,
    /// First or last byte is not [`DELIMITER`]
    MissingDelimiter,
    /// Unescaped [`DELIMITER`] inside the frame body
    UnexpectedDelimiter,
    /// [`ESCAPE`] as the last body byte
    DanglingEscape,
    /// [`ESCAPE`] followed by an undefined code
    UnknownEscapeCode(u8),
    /// LEN does not match the number of data bytes received
    LengthMismatch,
    /// Frame is well formed but the checksum does not match
    ChecksumMismatch,
}

impl FrameError {
    /// Framing violations, as opposed to payload or integrity problems
    pub fn is_malformed(&self) -> bool {
        !matches!(self, FrameError::PayloadTooLarge | FrameError::ChecksumMismatch)
    }
}

/// Decoded request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame<'a> {
    /// Slave address
    pub address: u8,
    /// Command identifier
    pub command: u8,
    /// Data field
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Value of the LEN byte
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Stuff this frame for transmission
    pub fn encode(&self) -> Result<WireBuffer, FrameError> {
        stuff(self.address, self.command, self.payload)
    }
}

/// Decoded response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response<'a> {
    /// Slave address
    pub address: u8,
    /// Command the slave is answering
    pub command: u8,
    /// Execution state; zero means the command succeeded
    pub state: u8,
    /// Data field
    pub payload: &'a [u8],
}

impl<'a> Response<'a> {
    /// Value of the LEN byte
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Whether the slave reported success
    pub fn is_ok(&self) -> bool {
        self.state == 0
    }

    /// Stuff this response for transmission
    pub fn encode(&self) -> Result<WireBuffer, FrameError> {
        stuff_response(self.address, self.command, self.state, self.payload)
    }
}

/// Writes escaped bytes while summing the logical ones
struct Stuffer {
    buffer: WireBuffer,
    checksum: Checksum,
}

impl Stuffer {
    fn new() -> Self {
        Self {
            buffer: WireBuffer::new(),
            checksum: Checksum::new(),
        }
    }

    fn raw(&mut self, byte: u8) -> Result<(), FrameError> {
        self.buffer
            .push(byte)
            .map_err(|_| FrameError::PayloadTooLarge)
    }

    fn add(&mut self, byte: u8) -> Result<(), FrameError> {
        self.checksum.update(byte);
        self.escaped(byte)
    }

    fn escaped(&mut self, byte: u8) -> Result<(), FrameError> {
        match escape_code(byte) {
            Some(code) => {
                self.raw(ESCAPE)?;
                self.raw(code)
            }
            None => self.raw(byte),
        }
    }

    fn finish(mut self) -> Result<WireBuffer, FrameError> {
        let crc = self.checksum.finish();
        self.escaped(crc)?;
        self.raw(DELIMITER)?;
        Ok(self.buffer)
    }
}

fn stuff_frame(header: &[u8], payload: &[u8]) -> Result<WireBuffer, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let mut stuffer = Stuffer::new();
    stuffer.raw(DELIMITER)?;
    for &byte in header {
        stuffer.add(byte)?;
    }
    stuffer.add(payload.len() as u8)?;
    for &byte in payload {
        stuffer.add(byte)?;
    }
    stuffer.finish()
}

/// Build the wire form of a request frame
pub fn stuff(address: u8, command: u8, payload: &[u8]) -> Result<WireBuffer, FrameError> {
    stuff_frame(&[address, command], payload)
}

/// Build the wire form of a response frame
pub fn stuff_response(
    address: u8,
    command: u8,
    state: u8,
    payload: &[u8],
) -> Result<WireBuffer, FrameError> {
    stuff_frame(&[address, command, state], payload)
}

/// Strip flags and escapes in place, returning the logical length
///
/// The read cursor starts past the opening flag and the write cursor at
/// zero, so the write cursor can never overtake the read cursor.
fn unescape_in_place(buffer: &mut WireBuffer) -> Result<usize, FrameError> {
    let received = buffer.len();
    if received < MIN_WIRE_FRAME_SIZE {
        return Err(FrameError::TooShort);
    }

    let bytes = buffer.as_mut_slice();
    let last = received - 1;
    if bytes[0] != DELIMITER || bytes[last] != DELIMITER {
        return Err(FrameError::MissingDelimiter);
    }

    let mut read = 1;
    let mut write = 0;
    while read < last {
        let byte = match bytes[read] {
            DELIMITER => return Err(FrameError::UnexpectedDelimiter),
            ESCAPE => {
                read += 1;
                if read == last {
                    return Err(FrameError::DanglingEscape);
                }
                let code = bytes[read];
                unescape_code(code).ok_or(FrameError::UnknownEscapeCode(code))?
            }
            byte => byte,
        };
        bytes[write] = byte;
        write += 1;
        read += 1;
    }

    buffer.truncate(write);
    Ok(write)
}

/// Unescape and validate; returns the logical bytes with CHK stripped
///
/// `header_len` counts the bytes before LEN (2 for requests, 3 for responses).
fn unstuff_logical(buffer: &mut WireBuffer, header_len: usize) -> Result<&[u8], FrameError> {
    let size = unescape_in_place(buffer)?;
    let logical = buffer.as_slice();

    // header + LEN + CHK
    if size < header_len + 2 {
        return Err(FrameError::LengthMismatch);
    }
    let length = logical[header_len] as usize;
    if length + header_len + 2 != size {
        return Err(FrameError::LengthMismatch);
    }

    let (body, crc) = logical.split_at(size - 1);
    if checksum(body) != crc[0] {
        return Err(FrameError::ChecksumMismatch);
    }

    Ok(body)
}

/// Decode a received request frame in place
///
/// On error the buffer contents are unspecified.
pub fn unstuff(buffer: &mut WireBuffer) -> Result<Frame<'_>, FrameError> {
    let body = unstuff_logical(buffer, 2)?;
    Ok(Frame {
        address: body[0],
        command: body[1],
        payload: &body[3..],
    })
}

/// Decode a received response frame in place
///
/// On error the buffer contents are unspecified.
pub fn unstuff_response(buffer: &mut WireBuffer) -> Result<Response<'_>, FrameError> {
    let body = unstuff_logical(buffer, 3)?;
    Ok(Response {
        address: body[0],
        command: body[1],
        state: body[2],
        payload: &body[4..],
    })
}
