//! Unified error types for rtmp-ingest

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all ingest operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network operations
    Io(io::Error),
    /// Chunk transport violation
    Protocol(ProtocolError),
    /// AMF0 encoding/decoding error
    Amf(AmfError),
    /// Handshake failure (fatal, closes the connection)
    Handshake(HandshakeError),
    /// Media pipeline collaborator failure
    Pipeline(String),
    /// Connection was closed by the peer
    ConnectionClosed,
    /// Operation timed out
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Pipeline(msg) => write!(f, "Pipeline error: {}", msg),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl Error {
    /// Whether the session can survive this error.
    ///
    /// Parse-level failures drop the offending message and keep the
    /// connection; handshake and I/O failures do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Amf(_) | Error::Pipeline(_))
    }
}

/// Chunk transport errors
#[derive(Debug)]
pub enum ProtocolError {
    /// Compressed chunk header on a chunk stream with no cached full
    /// header to inherit from
    InvalidChunkHeader,
    /// Declared message length exceeds the sanity limit
    MessageTooLarge { size: u32, max: u32 },
    /// Control message payload shorter than its fixed layout
    TruncatedControl(u8),
    /// Command message missing its name or transaction id
    InvalidCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::TruncatedControl(t) => {
                write!(f, "Truncated control message (type {})", t)
            }
            ProtocolError::InvalidCommand(msg) => write!(f, "Invalid command: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF0 encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    /// Marker byte outside the supported set
    UnknownMarker(u8),
    /// Buffer ended inside a value
    UnexpectedEof,
    /// String bytes were not valid UTF-8
    InvalidUtf8,
    /// Object nesting exceeded the depth limit
    NestingTooDeep,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake errors
#[derive(Debug)]
pub enum HandshakeError {
    /// C0 carried a version other than 3
    InvalidVersion(u8),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
        }
    }
}

impl std::error::Error for HandshakeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn test_error_display() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error"));

        let err = Error::Protocol(ProtocolError::InvalidChunkHeader);
        assert!(err.to_string().contains("Invalid chunk header"));

        let err = Error::Amf(AmfError::UnknownMarker(0xFF));
        assert!(err.to_string().contains("0xff"));

        let err = Error::Handshake(HandshakeError::InvalidVersion(6));
        assert!(err.to_string().contains("6"));

        let err = Error::Pipeline("ffmpeg spawn failed".into());
        assert!(err.to_string().contains("ffmpeg spawn failed"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = Error::Io(io_err);
        assert!(StdError::source(&err).is_some());

        let err = Error::Protocol(ProtocolError::InvalidChunkHeader);
        assert!(StdError::source(&err).is_none());
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = ProtocolError::MessageTooLarge { size: 100, max: 50 }.into();
        assert!(matches!(err, Error::Protocol(_)));

        let err: Error = AmfError::UnexpectedEof.into();
        assert!(matches!(err, Error::Amf(_)));

        let err: Error = HandshakeError::InvalidVersion(2).into();
        assert!(matches!(err, Error::Handshake(_)));
    }

    #[test]
    fn test_recoverability() {
        assert!(Error::Amf(AmfError::UnexpectedEof).is_recoverable());
        assert!(Error::Protocol(ProtocolError::InvalidChunkHeader).is_recoverable());
        assert!(!Error::Handshake(HandshakeError::InvalidVersion(6)).is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
    }
}
