//! Error types for r2-packet.
//!
//! [`PacketError`] describes what went wrong while framing or parsing a
//! packet. [`ErrorCode`] is the wire-stable code carried in the content of an
//! `Error` response, and [`Fault`] is the `(code, info)` pair every failing
//! operation in the router reduces to.

use thiserror::Error;

/// Errors that can occur during packet operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The packet size is outside the allowed range.
    #[error("invalid packet size: {size} bytes (allowed {min}..={max})")]
    InvalidSize {
        /// Declared or received size.
        size: usize,
        /// Minimum allowed size.
        min: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The buffer ended before the declared packet size.
    #[error("truncated packet: declared {declared} bytes, got {actual}")]
    Truncated {
        /// Size declared by the size field.
        declared: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Checksum mismatch.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadChecksum {
        /// Checksum computed over the packet.
        expected: u8,
        /// Checksum carried by the packet.
        actual: u8,
    },

    /// Arguments or content exceed the packet capacity.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

impl PacketError {
    /// The wire error code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PacketError::InvalidSize { .. }
            | PacketError::Truncated { .. }
            | PacketError::PayloadTooLarge { .. } => ErrorCode::InvalidRequestSize,
            PacketError::BadChecksum { .. } => ErrorCode::BadChecksum,
        }
    }
}

impl From<&PacketError> for Fault {
    fn from(err: &PacketError) -> Self {
        let info = match err {
            PacketError::InvalidSize { size, .. } => *size as u8,
            PacketError::Truncated { actual, .. } => *actual as u8,
            PacketError::BadChecksum { actual, .. } => *actual,
            PacketError::PayloadTooLarge { size, .. } => *size as u8,
        };
        Fault::new(err.error_code(), info)
    }
}

/// Error codes carried in `Error` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No device with the specified id was found.
    NoDeviceFound,
    /// The port is claimed by another device.
    PortInUse,
    /// The device type is not known.
    DeviceTypeNotFound,
    /// The device id is outside the device table.
    MaxDevicesInUse,
    /// The device does not support writes.
    NotWritable,
    /// The device does not support reads.
    NotReadable,
    /// Unknown action received.
    UnknownAction,
    /// Humidity sensor read failure.
    HumiditySensorRead,
    /// The remote node is not available.
    NodeNotAvailable,
    /// A mesh read returned too few bytes.
    BadSizeRead,
    /// A mesh exchange timed out.
    Timeout,
    /// A mesh write failed.
    WriteError,
    /// A mesh message had an unexpected type.
    UnknownMessageType,
    /// The master's read returned no data.
    NoNetworkData,
    /// Routing through a non-master node.
    RoutingThroughNonMaster,
    /// Same message received twice in succession.
    DuplicateMessage,
    /// Serial frame was not completed in time.
    SerialTimeout,
    /// The radio refused to sleep.
    FailedToSleep,
    /// Unread messages found in the master's input queue.
    MessageSynchronization,
    /// Declared request size out of range.
    InvalidRequestSize,
    /// Request checksum mismatch.
    BadChecksum,
    /// Arguments missing or out of range.
    InvalidArguments,
    /// Non-volatile storage failure.
    Storage,
    /// A code this firmware doesn't know.
    Unknown(u8),
}

impl ErrorCode {
    /// Errors caused by a lossy link rather than by the request itself; a
    /// host may resend the same request after one of these.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout
                | ErrorCode::SerialTimeout
                | ErrorCode::BadChecksum
                | ErrorCode::MessageSynchronization
                | ErrorCode::DuplicateMessage
                | ErrorCode::WriteError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NoDeviceFound => write!(f, "no device found"),
            ErrorCode::PortInUse => write!(f, "port in use"),
            ErrorCode::DeviceTypeNotFound => write!(f, "device type not found"),
            ErrorCode::MaxDevicesInUse => write!(f, "max devices in use"),
            ErrorCode::NotWritable => write!(f, "device not writable"),
            ErrorCode::NotReadable => write!(f, "device not readable"),
            ErrorCode::UnknownAction => write!(f, "unknown action"),
            ErrorCode::HumiditySensorRead => write!(f, "humidity sensor read error"),
            ErrorCode::NodeNotAvailable => write!(f, "node not available"),
            ErrorCode::BadSizeRead => write!(f, "bad size read"),
            ErrorCode::Timeout => write!(f, "timeout"),
            ErrorCode::WriteError => write!(f, "write error"),
            ErrorCode::UnknownMessageType => write!(f, "unknown message type"),
            ErrorCode::NoNetworkData => write!(f, "no network data"),
            ErrorCode::RoutingThroughNonMaster => write!(f, "routing through non-master"),
            ErrorCode::DuplicateMessage => write!(f, "duplicate message"),
            ErrorCode::SerialTimeout => write!(f, "serial timeout"),
            ErrorCode::FailedToSleep => write!(f, "failed to sleep"),
            ErrorCode::MessageSynchronization => write!(f, "message synchronization"),
            ErrorCode::InvalidRequestSize => write!(f, "invalid request size"),
            ErrorCode::BadChecksum => write!(f, "bad checksum"),
            ErrorCode::InvalidArguments => write!(f, "invalid arguments"),
            ErrorCode::Storage => write!(f, "storage error"),
            ErrorCode::Unknown(code) => write!(f, "unknown error ({})", code),
        }
    }
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        use crate::constants::*;
        match code {
            ERROR_CODE_NO_DEVICE_FOUND => ErrorCode::NoDeviceFound,
            ERROR_CODE_PORT_IN_USE => ErrorCode::PortInUse,
            ERROR_CODE_DEVICE_TYPE_NOT_FOUND => ErrorCode::DeviceTypeNotFound,
            ERROR_CODE_MAX_DEVICES_IN_USE => ErrorCode::MaxDevicesInUse,
            ERROR_CODE_NOT_WRITABLE => ErrorCode::NotWritable,
            ERROR_CODE_NOT_READABLE => ErrorCode::NotReadable,
            ERROR_CODE_UNKNOWN_ACTION => ErrorCode::UnknownAction,
            ERROR_CODE_HUMIDITY_SENSOR_READ => ErrorCode::HumiditySensorRead,
            ERROR_CODE_NODE_NOT_AVAILABLE => ErrorCode::NodeNotAvailable,
            ERROR_CODE_BAD_SIZE_READ => ErrorCode::BadSizeRead,
            ERROR_CODE_TIMEOUT => ErrorCode::Timeout,
            ERROR_CODE_WRITE_ERROR => ErrorCode::WriteError,
            ERROR_CODE_UNKNOWN_MESSAGE_TYPE => ErrorCode::UnknownMessageType,
            ERROR_CODE_NO_NETWORK_DATA => ErrorCode::NoNetworkData,
            ERROR_CODE_ROUTING_THROUGH_NON_MASTER => ErrorCode::RoutingThroughNonMaster,
            ERROR_CODE_DUPLICATE_MESSAGE => ErrorCode::DuplicateMessage,
            ERROR_CODE_SERIAL_TIMEOUT => ErrorCode::SerialTimeout,
            ERROR_CODE_FAILED_TO_SLEEP => ErrorCode::FailedToSleep,
            ERROR_CODE_MESSAGE_SYNCHRONIZATION => ErrorCode::MessageSynchronization,
            ERROR_CODE_INVALID_REQUEST_SIZE => ErrorCode::InvalidRequestSize,
            ERROR_CODE_BAD_CHECKSUM => ErrorCode::BadChecksum,
            ERROR_CODE_INVALID_ARGUMENTS => ErrorCode::InvalidArguments,
            ERROR_CODE_STORAGE => ErrorCode::Storage,
            _ => ErrorCode::Unknown(code),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        use crate::constants::*;
        match code {
            ErrorCode::NoDeviceFound => ERROR_CODE_NO_DEVICE_FOUND,
            ErrorCode::PortInUse => ERROR_CODE_PORT_IN_USE,
            ErrorCode::DeviceTypeNotFound => ERROR_CODE_DEVICE_TYPE_NOT_FOUND,
            ErrorCode::MaxDevicesInUse => ERROR_CODE_MAX_DEVICES_IN_USE,
            ErrorCode::NotWritable => ERROR_CODE_NOT_WRITABLE,
            ErrorCode::NotReadable => ERROR_CODE_NOT_READABLE,
            ErrorCode::UnknownAction => ERROR_CODE_UNKNOWN_ACTION,
            ErrorCode::HumiditySensorRead => ERROR_CODE_HUMIDITY_SENSOR_READ,
            ErrorCode::NodeNotAvailable => ERROR_CODE_NODE_NOT_AVAILABLE,
            ErrorCode::BadSizeRead => ERROR_CODE_BAD_SIZE_READ,
            ErrorCode::Timeout => ERROR_CODE_TIMEOUT,
            ErrorCode::WriteError => ERROR_CODE_WRITE_ERROR,
            ErrorCode::UnknownMessageType => ERROR_CODE_UNKNOWN_MESSAGE_TYPE,
            ErrorCode::NoNetworkData => ERROR_CODE_NO_NETWORK_DATA,
            ErrorCode::RoutingThroughNonMaster => ERROR_CODE_ROUTING_THROUGH_NON_MASTER,
            ErrorCode::DuplicateMessage => ERROR_CODE_DUPLICATE_MESSAGE,
            ErrorCode::SerialTimeout => ERROR_CODE_SERIAL_TIMEOUT,
            ErrorCode::FailedToSleep => ERROR_CODE_FAILED_TO_SLEEP,
            ErrorCode::MessageSynchronization => ERROR_CODE_MESSAGE_SYNCHRONIZATION,
            ErrorCode::InvalidRequestSize => ERROR_CODE_INVALID_REQUEST_SIZE,
            ErrorCode::BadChecksum => ERROR_CODE_BAD_CHECKSUM,
            ErrorCode::InvalidArguments => ERROR_CODE_INVALID_ARGUMENTS,
            ErrorCode::Storage => ERROR_CODE_STORAGE,
            ErrorCode::Unknown(code) => code,
        }
    }
}

/// A `(code, info)` pair describing a failed operation.
///
/// `info` is auxiliary and code specific: the offending action byte, the
/// node address that couldn't be reached, the size that was read, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fault {
    /// Error code.
    pub code: ErrorCode,
    /// Auxiliary information.
    pub info: u8,
}

impl Fault {
    /// Create a fault with auxiliary info.
    pub const fn new(code: ErrorCode, info: u8) -> Self {
        Fault { code, info }
    }

    /// Create a fault without auxiliary info.
    pub const fn code(code: ErrorCode) -> Self {
        Fault { code, info: 0 }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (info 0x{:02X})", self.code, self.info)
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PacketError::BadChecksum { expected: 0x12, actual: 0x34 };
        assert!(err.to_string().contains("0x12"));
        assert_eq!(err.error_code(), ErrorCode::BadChecksum);

        let fault = Fault::from(&err);
        assert_eq!(fault.info, 0x34);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(u8::from(ErrorCode::NoDeviceFound), 1);
        assert_eq!(u8::from(ErrorCode::DuplicateMessage), 16);
        assert_eq!(u8::from(ErrorCode::BadChecksum), 21);
        assert_eq!(ErrorCode::from(19), ErrorCode::MessageSynchronization);
        assert_eq!(ErrorCode::from(0xF3), ErrorCode::Unknown(0xF3));
    }
}
