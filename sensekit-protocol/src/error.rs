//! Error types for SHDLC exchanges

use crate::frame::FrameError;

/// The channel did not carry the bytes as asked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Fewer bytes accepted than requested
    ShortWrite { requested: usize, written: usize },
    /// Channel reported an I/O error
    Io(embedded_io::ErrorKind),
}

impl TransportError {
    pub(crate) fn from_io<E: embedded_io::Error>(error: E) -> Self {
        TransportError::Io(error.kind())
    }
}

/// Failure of a send or send-and-receive exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShdlcError {
    /// Channel write or read failed
    Transport(TransportError),
    /// Reply was malformed or failed its checksum
    Frame(FrameError),
    /// Slave answered with a nonzero state byte
    UnsupportedCommand(u8),
    /// Reply data does not fit the caller's buffer
    BufferTooSmall { length: usize, capacity: usize },
}

impl ShdlcError {
    /// The wire worked but the data can't be used (integrity or capacity)
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ShdlcError::Frame(FrameError::ChecksumMismatch) | ShdlcError::BufferTooSmall { .. }
        )
    }

    /// The reply could not be parsed as a frame
    pub fn is_malformed(&self) -> bool {
        matches!(self, ShdlcError::Frame(e) if e.is_malformed())
    }
}

impl From<TransportError> for ShdlcError {
    fn from(error: TransportError) -> Self {
        ShdlcError::Transport(error)
    }
}

impl From<FrameError> for ShdlcError {
    fn from(error: FrameError) -> Self {
        ShdlcError::Frame(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(ShdlcError::Frame(FrameError::ChecksumMismatch).is_data_error());
        assert!(!ShdlcError::Frame(FrameError::ChecksumMismatch).is_malformed());
        assert!(ShdlcError::BufferTooSmall { length: 6, capacity: 4 }.is_data_error());

        assert!(ShdlcError::Frame(FrameError::UnknownEscapeCode(0x00)).is_malformed());
        assert!(ShdlcError::Frame(FrameError::TooShort).is_malformed());

        let transport = ShdlcError::from(TransportError::ShortWrite { requested: 7, written: 3 });
        assert!(!transport.is_data_error());
        assert!(!transport.is_malformed());
        assert!(!ShdlcError::UnsupportedCommand(0x02).is_data_error());
    }
}
