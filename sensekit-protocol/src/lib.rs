//! SHDLC link layer
//!
//! Sensirion's SHDLC protocol carries request/response pairs over a plain
//! UART. Each message is wrapped in a self-delimiting, byte-stuffed frame
//! with a one-byte checksum:
//!
//! ```text
//! ┌──────┬──────┬─────┬───────┬─────┬─────────────┬─────┬──────┐
//! │ 0x7E │ ADDR │ CMD │(STATE)│ LEN │ DATA        │ CHK │ 0x7E │
//! │ 1B   │ 1B   │ 1B  │ 1B    │ 1B  │ 0–255B      │ 1B  │ 1B   │
//! └──────┴──────┴─────┴───────┴─────┴─────────────┴─────┴──────┘
//! ```
//!
//! STATE is only present in responses. Everything between the two flags is
//! escaped so that 0x7E never appears inside a frame.
//!
//! - [`checksum`] - one's-complement byte sum
//! - [`buffer`] - fixed-capacity wire buffer
//! - [`frame`] - stuffing (encode) and in-place unstuffing (decode)
//! - [`session`] - send / receive / send-and-receive over a [`ByteStream`]
//!
//! [`ByteStream`]: sensekit_hal::ByteStream

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

mod fmt;

pub mod buffer;
pub mod checksum;
pub mod error;
pub mod frame;
pub mod session;

pub use buffer::{WireBuffer, MAX_PAYLOAD_SIZE, MAX_WIRE_FRAME_SIZE};
pub use checksum::checksum;
pub use error::{ShdlcError, TransportError};
pub use frame::{
    stuff, stuff_response, unstuff, unstuff_response, Frame, FrameError, Response, DELIMITER,
    ESCAPE, MIN_WIRE_FRAME_SIZE,
};
pub use session::{Session, SessionConfig, WAKE_UP_BYTE};
