//! Request and response packages.

use crate::{
    Action, ErrorCode, Fault, MAX_CONTENT_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};

/// A request addressed to a node.
///
/// `checksum` is only meaningful on a decoded request; encoding always
/// recomputes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPackage {
    /// Checksum as carried on the wire.
    pub checksum: u8,
    /// Target node address (0 = local node / master).
    pub host: u8,
    /// Requested action.
    pub action: Action,
    /// Device id or action-specific argument.
    pub id: u8,
    /// Action arguments (at most `MAX_CONTENT_SIZE` bytes).
    pub args: Vec<u8>,
}

impl RequestPackage {
    /// Create a request with no arguments.
    pub fn new(host: u8, action: Action, id: u8) -> Self {
        RequestPackage {
            checksum: 0,
            host,
            action,
            id,
            args: Vec::new(),
        }
    }

    /// Attach arguments.
    pub fn with_args(mut self, args: impl Into<Vec<u8>>) -> Self {
        self.args = args.into();
        self
    }

    /// Size of the encoded request.
    pub fn wire_size(&self) -> usize {
        REQUEST_HEADER_SIZE + self.args.len()
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<u8> {
        self.args.get(index).copied()
    }
}

/// A response produced by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePackage {
    /// Checksum as carried on the wire.
    pub checksum: u8,
    /// Rolling per-node message counter, excluded from the checksum.
    pub message_id: u8,
    /// Node address that produced the response.
    pub host: u8,
    /// Action being answered, or `Error`.
    pub action: Action,
    /// Device id the response is about.
    pub id: u8,
    /// Response content (at most `MAX_CONTENT_SIZE` bytes).
    pub content: Vec<u8>,
}

impl ResponsePackage {
    /// Create a response with no content.
    pub fn new(host: u8, action: Action, id: u8) -> Self {
        ResponsePackage {
            checksum: 0,
            message_id: 0,
            host,
            action,
            id,
            content: Vec::new(),
        }
    }

    /// Attach content, truncated to `MAX_CONTENT_SIZE`.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        let mut content = content.into();
        content.truncate(MAX_CONTENT_SIZE);
        self.content = content;
        self
    }

    /// Build an `Error` response whose content is `[code, info]`.
    pub fn error(host: u8, id: u8, fault: Fault) -> Self {
        ResponsePackage::new(host, Action::Error, id)
            .with_content(vec![u8::from(fault.code), fault.info])
    }

    /// Build the empty `NoMessageRead` marker.
    pub fn no_message(host: u8) -> Self {
        ResponsePackage::new(host, Action::NoMessageRead, 0)
    }

    /// Size of the encoded response.
    pub fn wire_size(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.content.len()
    }

    /// Whether this response reports an error.
    pub fn is_error(&self) -> bool {
        self.action == Action::Error
    }

    /// The fault carried by an `Error` response.
    pub fn fault(&self) -> Option<Fault> {
        if !self.is_error() {
            return None;
        }
        let code = ErrorCode::from(*self.content.first()?);
        let info = self.content.get(1).copied().unwrap_or(0);
        Some(Fault::new(code, info))
    }

    /// Interpret the content as little-endian 16-bit values.
    pub fn values(&self) -> Vec<u16> {
        self.content
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}
