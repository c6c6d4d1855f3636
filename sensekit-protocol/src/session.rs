//! Request/response session over a byte channel
//!
//! Strictly half duplex: one request goes out, one response comes back.
//! Every operation takes `&mut self`, so an exchange owns the channel from
//! the first byte written until the reply is decoded. Nothing is kept
//! between calls; the wire buffer lives on the stack of each call.

use sensekit_hal::ByteStream;

use crate::buffer::WireBuffer;
use crate::error::{ShdlcError, TransportError};
use crate::frame::{self, DELIMITER};

/// Byte sent ahead of the first frame to wake a UART peer
pub const WAKE_UP_BYTE: u8 = 0xFF;

/// Session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// How long to wait for a complete response frame
    pub response_timeout_ms: u32,
}

impl SessionConfig {
    /// 20 ms: enough for commands the slave answers immediately
    pub const TIGHT: Self = Self {
        response_timeout_ms: 20,
    };

    /// 200 ms: covers commands that touch the slave's flash
    pub const RELAXED: Self = Self {
        response_timeout_ms: 200,
    };

    /// Custom response timeout
    pub const fn with_timeout(response_timeout_ms: u32) -> Self {
        Self {
            response_timeout_ms,
        }
    }
}

/// SHDLC master side of a serial link
pub struct Session<C> {
    channel: C,
    config: SessionConfig,
}

impl<C: ByteStream> Session<C> {
    /// Take ownership of `channel`
    pub fn new(channel: C, config: SessionConfig) -> Self {
        Self { channel, config }
    }

    /// Current settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Change the response timeout for subsequent exchanges
    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    /// Access the underlying channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give the channel back
    pub fn release(self) -> C {
        self.channel
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let written = self
            .channel
            .write(bytes)
            .map_err(TransportError::from_io)?;
        if written != bytes.len() {
            warn!("SHDLC short write: {} of {} bytes", written, bytes.len());
            return Err(TransportError::ShortWrite {
                requested: bytes.len(),
                written,
            });
        }
        Ok(())
    }

    /// Stuff and transmit one request frame
    ///
    /// A short write is an error; nothing is retried.
    pub fn send(&mut self, address: u8, command: u8, payload: &[u8]) -> Result<(), ShdlcError> {
        let buffer = frame::stuff(address, command, payload)?;
        debug!(
            "SHDLC send {} bytes: {=[u8]:x}",
            buffer.len(),
            buffer.as_slice()
        );
        self.write(buffer.as_slice())?;
        Ok(())
    }

    /// Read raw bytes up to the closing flag or until `timeout_ms` elapses
    ///
    /// Whatever arrived before the timeout is returned undecoded.
    pub fn receive_frame(&mut self, timeout_ms: u32) -> Result<WireBuffer, TransportError> {
        let mut buffer = WireBuffer::new();
        let channel = &mut self.channel;
        let received = buffer
            .fill_with(|raw| channel.read_until(DELIMITER, raw, timeout_ms))
            .map_err(TransportError::from_io)?;
        debug!(
            "SHDLC received {} bytes: {=[u8]:x}",
            received,
            buffer.as_slice()
        );
        Ok(buffer)
    }

    /// Send a request and copy the response data into `response`
    ///
    /// Returns the number of data bytes copied. `response.len()` is the
    /// capacity; a longer reply is rejected and nothing is copied.
    pub fn send_and_receive(
        &mut self,
        address: u8,
        command: u8,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, ShdlcError> {
        self.send(address, command, request)?;

        let mut buffer = self.receive_frame(self.config.response_timeout_ms)?;
        let reply = frame::unstuff_response(&mut buffer).map_err(|e| {
            debug!("SHDLC unstuffing error: {}", e);
            ShdlcError::Frame(e)
        })?;

        if !reply.is_ok() {
            debug!(
                "SHDLC command {=u8:#x} refused, state {=u8:#x}",
                reply.command,
                reply.state
            );
            return Err(ShdlcError::UnsupportedCommand(reply.state));
        }

        let length = reply.payload.len();
        if length > response.len() {
            debug!(
                "SHDLC response of {} bytes exceeds buffer of {}",
                length,
                response.len()
            );
            return Err(ShdlcError::BufferTooSmall {
                length,
                capacity: response.len(),
            });
        }

        response[..length].copy_from_slice(reply.payload);
        trace!("SHDLC received payload of {} bytes", length);
        Ok(length)
    }

    /// Send a request whose response carries no data
    pub fn execute(&mut self, address: u8, command: u8, request: &[u8]) -> Result<(), ShdlcError> {
        self.send_and_receive(address, command, request, &mut [])
            .map(|_| ())
    }

    /// Wake a sleeping UART peer with a single raw byte
    ///
    /// Not framed: the byte only has to toggle the peer's RX line.
    pub fn activate_transport(&mut self) -> Result<(), TransportError> {
        self.write(&[WAKE_UP_BYTE])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{stuff_response, FrameError};
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MockError;

    impl embedded_io::Error for MockError {
        fn kind(&self) -> embedded_io::ErrorKind {
            embedded_io::ErrorKind::NotConnected
        }
    }

    /// Scripted channel: records writes, replays one canned reply per read
    #[derive(Default)]
    pub struct MockChannel {
        pub written: Vec<Vec<u8>>,
        pub replies: Vec<Vec<u8>>,
        pub timeouts: Vec<u32>,
        pub write_limit: Option<usize>,
        pub fail_io: bool,
        pub fail_read: bool,
    }

    impl MockChannel {
        pub fn replying(reply: &[u8]) -> Self {
            Self {
                replies: std::vec![reply.to_vec()],
                ..Default::default()
            }
        }
    }

    impl ByteStream for MockChannel {
        type Error = MockError;

        fn write(&mut self, data: &[u8]) -> Result<usize, MockError> {
            if self.fail_io {
                return Err(MockError);
            }
            let n = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
            self.written.push(data[..n].to_vec());
            Ok(n)
        }

        fn read_until(
            &mut self,
            _delimiter: u8,
            buf: &mut [u8],
            timeout_ms: u32,
        ) -> Result<usize, MockError> {
            self.timeouts.push(timeout_ms);
            if self.fail_read {
                return Err(MockError);
            }
            if self.replies.is_empty() {
                return Ok(0);
            }
            let reply = self.replies.remove(0);
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    fn session(channel: MockChannel) -> Session<MockChannel> {
        Session::new(channel, SessionConfig::TIGHT)
    }

    #[test]
    fn test_send_writes_stuffed_frame() {
        let mut session = session(MockChannel::default());
        session.send(0x00, 0x11, &[]).unwrap();

        let channel = session.release();
        assert_eq!(channel.written, [[0x7E, 0x00, 0x7D, 0x31, 0x00, 0xEE, 0x7E]]);
    }

    #[test]
    fn test_send_short_write() {
        let mut session = session(MockChannel {
            write_limit: Some(3),
            ..Default::default()
        });

        assert_eq!(
            session.send(0x00, 0x00, &[0x01, 0x03]),
            Err(ShdlcError::Transport(TransportError::ShortWrite {
                requested: 8,
                written: 3
            }))
        );
    }

    #[test]
    fn test_send_io_error() {
        let mut session = session(MockChannel {
            fail_io: true,
            ..Default::default()
        });

        assert_eq!(
            session.send(0x00, 0x01, &[]),
            Err(ShdlcError::Transport(TransportError::Io(
                embedded_io::ErrorKind::NotConnected
            )))
        );
    }

    #[test]
    fn test_send_and_receive_copies_payload() {
        let reply = stuff_response(0x00, 0xD1, 0x00, &[2, 2, 0, 7, 0, 2, 0]).unwrap();
        let mut session = session(MockChannel::replying(reply.as_slice()));

        let mut data = [0u8; 7];
        let n = session.send_and_receive(0x00, 0xD1, &[], &mut data).unwrap();

        assert_eq!(n, 7);
        assert_eq!(data, [2, 2, 0, 7, 0, 2, 0]);
        assert_eq!(session.channel_mut().timeouts, [20]);
    }

    #[test]
    fn test_send_and_receive_uses_configured_timeout() {
        let reply = stuff_response(0x00, 0x80, 0x00, &[]).unwrap();
        let mut session = Session::new(
            MockChannel::replying(reply.as_slice()),
            SessionConfig::RELAXED,
        );

        session.execute(0x00, 0x80, &[0x00, 0, 0, 0, 10]).unwrap();
        assert_eq!(session.channel_mut().timeouts, [200]);
    }

    #[test]
    fn test_response_larger_than_buffer() {
        let reply = stuff_response(0x00, 0x03, 0x00, &[1, 2, 3, 4, 5, 6]).unwrap();
        let mut session = session(MockChannel::replying(reply.as_slice()));

        let mut data = [0u8; 4];
        let result = session.send_and_receive(0x00, 0x03, &[], &mut data);

        assert_eq!(
            result,
            Err(ShdlcError::BufferTooSmall {
                length: 6,
                capacity: 4
            })
        );
        assert!(result.unwrap_err().is_data_error());
        assert_eq!(data, [0u8; 4]);
    }

    #[test]
    fn test_nonzero_state_is_unsupported_command() {
        let reply = stuff_response(0x00, 0x10, 0x02, &[]).unwrap();
        let mut session = session(MockChannel::replying(reply.as_slice()));

        assert_eq!(
            session.send_and_receive(0x00, 0x10, &[], &mut []),
            Err(ShdlcError::UnsupportedCommand(0x02))
        );
    }

    #[test]
    fn test_timeout_yields_malformed_frame() {
        // Reply cut short by the timeout
        let mut session = session(MockChannel::replying(&[0x7E, 0x00, 0x03]));

        let result = session.send_and_receive(0x00, 0x03, &[], &mut [0u8; 40]);
        assert_eq!(result, Err(ShdlcError::Frame(FrameError::TooShort)));
        assert!(result.unwrap_err().is_malformed());
    }

    #[test]
    fn test_no_reply_at_all() {
        let mut session = session(MockChannel::default());
        assert_eq!(
            session.send_and_receive(0x00, 0x03, &[], &mut []),
            Err(ShdlcError::Frame(FrameError::TooShort))
        );
    }

    #[test]
    fn test_corrupted_reply() {
        let reply = stuff_response(0x00, 0x03, 0x00, &[0x10, 0x20]).unwrap();
        let mut bytes = reply.as_slice().to_vec();
        bytes[5] ^= 0x01; // first data byte 0x10 -> 0x11 (raw, no escape)
        let mut session = session(MockChannel::replying(&bytes));

        let result = session.send_and_receive(0x00, 0x03, &[], &mut [0u8; 2]);
        assert_eq!(result, Err(ShdlcError::Frame(FrameError::ChecksumMismatch)));
    }

    #[test]
    fn test_receive_frame_returns_raw_bytes() {
        let mut session = session(MockChannel::replying(&[0x7E, 0x01, 0x7E]));
        let buffer = session.receive_frame(5).unwrap();
        assert_eq!(buffer.as_slice(), &[0x7E, 0x01, 0x7E]);
        assert_eq!(session.channel_mut().timeouts, [5]);
    }

    #[test]
    fn test_activate_transport_sends_single_raw_byte() {
        let mut session = session(MockChannel::default());
        session.activate_transport().unwrap();
        assert_eq!(session.release().written, [[WAKE_UP_BYTE]]);
    }

    #[test]
    fn test_activate_transport_short_write() {
        let mut session = session(MockChannel {
            write_limit: Some(0),
            ..Default::default()
        });
        assert_eq!(
            session.activate_transport(),
            Err(TransportError::ShortWrite {
                requested: 1,
                written: 0
            })
        );
    }

    #[test]
    fn test_read_error_is_transport_error() {
        let mut session = session(MockChannel {
            fail_read: true,
            ..Default::default()
        });
        assert_eq!(
            session.send_and_receive(0x00, 0x03, &[], &mut [0u8; 40]),
            Err(ShdlcError::Transport(TransportError::Io(
                embedded_io::ErrorKind::NotConnected
            )))
        );
        // the request still went out
        assert_eq!(session.channel_mut().written.len(), 1);
    }

    #[test]
    fn test_receive_frame_read_error() {
        let mut session = session(MockChannel {
            fail_read: true,
            ..Default::default()
        });
        assert_eq!(
            session.receive_frame(5).map(|b| b.len()),
            Err(TransportError::Io(embedded_io::ErrorKind::NotConnected))
        );
    }
}
