use std::fmt;

/// Failure reported by the byte-transfer layer (SPI bus or GPIO line).
#[derive(Debug, thiserror::Error)]
#[error("transport: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Which half of a two-phase block write was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Address,
    Data,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::Address => f.write_str("address"),
            WritePhase::Data => f.write_str("data"),
        }
    }
}

/// Broad failure category, used by callers that only need to know where
/// an operation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Authentication,
    WriteAck,
}

/// Every driver operation fails through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The chip never raised a completion or timer interrupt before the deadline.
    #[error("no completion interrupt before deadline")]
    Timeout,

    /// The chip's own timer fired: nothing answered the frame.
    #[error("no tag answered")]
    NoTag,

    /// ErrorReg reported collision, parity, buffer overflow or protocol flags.
    #[error("chip error flags {0:#04x}")]
    ErrorFlags(u8),

    #[error("expected {expected} response bits, got {actual}")]
    BitLength { expected: usize, actual: usize },

    #[error("expected {expected} response bytes, got {actual}")]
    ResponseLength { expected: usize, actual: usize },

    #[error("UID checksum mismatch")]
    UidChecksum,

    #[error("CRC coprocessor did not finish")]
    CrcTimeout,

    #[error("authentication failed: crypto1 not active")]
    Authentication,

    #[error("{phase} phase not acknowledged (ack {ack:#03x})")]
    WriteAck { phase: WritePhase, ack: u8 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Authentication => ErrorKind::Authentication,
            Error::WriteAck { .. } => ErrorKind::WriteAck,
            Error::Timeout
            | Error::NoTag
            | Error::ErrorFlags(_)
            | Error::BitLength { .. }
            | Error::ResponseLength { .. }
            | Error::UidChecksum
            | Error::CrcTimeout => ErrorKind::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::NoTag.kind(), ErrorKind::Protocol);
        assert_eq!(Error::UidChecksum.kind(), ErrorKind::Protocol);
        assert_eq!(Error::Authentication.kind(), ErrorKind::Authentication);
        assert_eq!(
            Error::WriteAck {
                phase: WritePhase::Data,
                ack: 0x4
            }
            .kind(),
            ErrorKind::WriteAck
        );
        assert_eq!(
            Error::from(TransportError::new("spi closed")).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_write_ack_message() {
        let err = Error::WriteAck {
            phase: WritePhase::Address,
            ack: 0x4,
        };
        assert_eq!(err.to_string(), "address phase not acknowledged (ack 0x4)");
    }
}
