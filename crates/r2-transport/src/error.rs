//! Transport error types.

use r2_packet::{ErrorCode, Fault, PacketError};
use thiserror::Error;

/// Errors seen by the host side of a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The link failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A received frame did not decode.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// No complete reply before the deadline.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The peer closed the link.
    #[error("link closed")]
    Closed,

    /// The I2C bus transferred fewer bytes than asked for.
    #[error("short I2C transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes requested.
        expected: usize,
        /// Bytes transferred.
        actual: usize,
    },
}

impl TransportError {
    /// Whether resending the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::ShortTransfer { .. } => true,
            TransportError::Packet(err) => err.error_code().is_retryable(),
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            TransportError::Closed => false,
        }
    }
}

impl From<&TransportError> for Fault {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Packet(err) => Fault::from(err),
            TransportError::Timeout => Fault::code(ErrorCode::Timeout),
            TransportError::ShortTransfer { actual, .. } => {
                Fault::new(ErrorCode::BadSizeRead, *actual as u8)
            }
            TransportError::Io(_) | TransportError::Closed => Fault::code(ErrorCode::WriteError),
        }
    }
}
