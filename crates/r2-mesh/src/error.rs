//! Mesh session errors.

use r2_packet::{Action, ErrorCode, Fault, PacketError};
use thiserror::Error;

/// Failures of a mesh exchange or of the slave loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// The node is not in the routing table.
    #[error("node {node} not routed ({routed} nodes known)")]
    NodeNotAvailable {
        /// Requested node.
        node: u8,
        /// Size of the routing table.
        routed: usize,
    },

    /// A message shorter than a packet header.
    #[error("message of {size} bytes is too short")]
    BadSizeRead {
        /// Bytes received.
        size: usize,
    },

    /// No reply before the read timeout.
    #[error("no reply from node {node}")]
    Timeout {
        /// Node that was asked.
        node: u8,
    },

    /// The radio did not acknowledge a write.
    #[error("write to node {node} failed")]
    WriteFailed {
        /// Destination node.
        node: u8,
    },

    /// A message type other than protocol message or ping.
    #[error("unknown message type 0x{kind:02X}")]
    UnknownMessageType {
        /// Type byte.
        kind: u8,
    },

    /// A ping without its payload byte.
    #[error("empty ping from address {from}")]
    NoNetworkData {
        /// Mesh address of the sender.
        from: u16,
    },

    /// An unsolicited message was waiting before a send.
    #[error("unread message in the pipe before {action}")]
    Synchronization {
        /// Action of the request about to be sent.
        action: Action,
    },

    /// The same message arrived twice in a row.
    #[error("duplicate message {message_id} from node {node}")]
    Duplicate {
        /// Sending node.
        node: u8,
        /// Repeated message id.
        message_id: u8,
    },

    /// The radio refused to enter low-power mode.
    #[error("failed to sleep")]
    FailedToSleep,

    /// A message did not decode.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

impl From<&MeshError> for Fault {
    fn from(err: &MeshError) -> Self {
        match err {
            MeshError::NodeNotAvailable { routed, .. } => {
                Fault::new(ErrorCode::NodeNotAvailable, *routed as u8)
            }
            MeshError::BadSizeRead { size } => Fault::new(ErrorCode::BadSizeRead, *size as u8),
            MeshError::Timeout { .. } => Fault::code(ErrorCode::Timeout),
            MeshError::WriteFailed { node } => Fault::new(ErrorCode::WriteError, *node),
            MeshError::UnknownMessageType { kind } => {
                Fault::new(ErrorCode::UnknownMessageType, *kind)
            }
            MeshError::NoNetworkData { from } => Fault::new(ErrorCode::NoNetworkData, *from as u8),
            MeshError::Synchronization { action } => {
                Fault::new(ErrorCode::MessageSynchronization, u8::from(*action))
            }
            MeshError::Duplicate { message_id, .. } => {
                Fault::new(ErrorCode::DuplicateMessage, *message_id)
            }
            MeshError::FailedToSleep => Fault::code(ErrorCode::FailedToSleep),
            MeshError::Packet(err) => Fault::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_info() {
        let fault = Fault::from(&MeshError::Synchronization {
            action: Action::GetDevice,
        });
        assert_eq!(fault, Fault::new(ErrorCode::MessageSynchronization, 0x03));

        let fault = Fault::from(&MeshError::NodeNotAvailable { node: 7, routed: 2 });
        assert_eq!(fault, Fault::new(ErrorCode::NodeNotAvailable, 2));

        let fault = Fault::from(&MeshError::Duplicate {
            node: 1,
            message_id: 42,
        });
        assert_eq!(fault, Fault::new(ErrorCode::DuplicateMessage, 42));
    }
}
