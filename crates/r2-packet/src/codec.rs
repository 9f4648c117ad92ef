//! Packet encoding and decoding.
//!
//! ## Request Format
//!
//! | Field    | Size | Description                           |
//! |----------|------|---------------------------------------|
//! | checksum | 1    | Wrapping sum of every following byte  |
//! | host     | 1    | Target node address                   |
//! | action   | 1    | Action code                           |
//! | id       | 1    | Device id or action argument          |
//! | argSize  | 1    | Number of argument bytes              |
//! | args     | N    | Up to `MAX_CONTENT_SIZE` bytes        |
//!
//! ## Response Format
//!
//! | Field       | Size | Description                                    |
//! |-------------|------|------------------------------------------------|
//! | checksum    | 1    | Wrapping sum of host through the last content  |
//! | messageId   | 1    | Rolling counter, not covered by the checksum   |
//! | host        | 1    | Responding node address                        |
//! | action      | 1    | Action answered, or `Error`                    |
//! | id          | 1    | Device id                                      |
//! | contentSize | 1    | Number of content bytes                        |
//! | content     | N    | Up to `MAX_CONTENT_SIZE` bytes                 |

use bytes::{BufMut, BytesMut};

use crate::{
    Action, PacketError, RequestPackage, ResponsePackage, MAX_CONTENT_SIZE, MAX_REQUEST_SIZE,
    MAX_RESPONSE_SIZE, MIN_REQUEST_SIZE, MIN_RESPONSE_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};

// ============================================================================
// Checksums
// ============================================================================

fn wrapping_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checksum of an encoded request (bytes 1 through the end).
pub fn request_checksum(bytes: &[u8]) -> u8 {
    bytes.get(1..).map(wrapping_sum).unwrap_or(0)
}

/// Checksum of an encoded response (bytes 2 through the end).
pub fn response_checksum(bytes: &[u8]) -> u8 {
    bytes.get(2..).map(wrapping_sum).unwrap_or(0)
}

// ============================================================================
// Requests
// ============================================================================

/// Encode a request, computing its checksum.
pub fn encode_request(request: &RequestPackage) -> Result<Vec<u8>, PacketError> {
    if request.args.len() > MAX_CONTENT_SIZE {
        return Err(PacketError::PayloadTooLarge {
            size: request.args.len(),
            max: MAX_CONTENT_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(request.wire_size());
    buf.put_u8(0);
    buf.put_u8(request.host);
    buf.put_u8(request.action.into());
    buf.put_u8(request.id);
    buf.put_u8(request.args.len() as u8);
    buf.put_slice(&request.args);

    buf[0] = request_checksum(&buf);
    Ok(buf.to_vec())
}

/// Decode a request and verify its checksum.
///
/// The declared size is checked against the allowed range before any
/// argument bytes are looked at.
pub fn decode_request(bytes: &[u8]) -> Result<RequestPackage, PacketError> {
    if bytes.len() < MIN_REQUEST_SIZE {
        return Err(PacketError::InvalidSize {
            size: bytes.len(),
            min: MIN_REQUEST_SIZE,
            max: MAX_REQUEST_SIZE,
        });
    }

    let declared = REQUEST_HEADER_SIZE + bytes[4] as usize;
    if declared > MAX_REQUEST_SIZE {
        return Err(PacketError::InvalidSize {
            size: declared,
            min: MIN_REQUEST_SIZE,
            max: MAX_REQUEST_SIZE,
        });
    }
    if bytes.len() < declared {
        return Err(PacketError::Truncated {
            declared,
            actual: bytes.len(),
        });
    }

    let bytes = &bytes[..declared];
    let expected = request_checksum(bytes);
    if expected != bytes[0] {
        return Err(PacketError::BadChecksum {
            expected,
            actual: bytes[0],
        });
    }

    Ok(RequestPackage {
        checksum: bytes[0],
        host: bytes[1],
        action: Action::from(bytes[2]),
        id: bytes[3],
        args: bytes[REQUEST_HEADER_SIZE..].to_vec(),
    })
}

// ============================================================================
// Responses
// ============================================================================

/// Encode a response, computing its checksum.
pub fn encode_response(response: &ResponsePackage) -> Result<Vec<u8>, PacketError> {
    if response.content.len() > MAX_CONTENT_SIZE {
        return Err(PacketError::PayloadTooLarge {
            size: response.content.len(),
            max: MAX_CONTENT_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(response.wire_size());
    buf.put_u8(0);
    buf.put_u8(response.message_id);
    buf.put_u8(response.host);
    buf.put_u8(response.action.into());
    buf.put_u8(response.id);
    buf.put_u8(response.content.len() as u8);
    buf.put_slice(&response.content);

    buf[0] = response_checksum(&buf);
    Ok(buf.to_vec())
}

/// Decode a response and verify its checksum.
pub fn decode_response(bytes: &[u8]) -> Result<ResponsePackage, PacketError> {
    if bytes.len() < MIN_RESPONSE_SIZE {
        return Err(PacketError::InvalidSize {
            size: bytes.len(),
            min: MIN_RESPONSE_SIZE,
            max: MAX_RESPONSE_SIZE,
        });
    }

    let declared = RESPONSE_HEADER_SIZE + bytes[5] as usize;
    if declared > MAX_RESPONSE_SIZE {
        return Err(PacketError::InvalidSize {
            size: declared,
            min: MIN_RESPONSE_SIZE,
            max: MAX_RESPONSE_SIZE,
        });
    }
    if bytes.len() < declared {
        return Err(PacketError::Truncated {
            declared,
            actual: bytes.len(),
        });
    }

    let bytes = &bytes[..declared];
    let expected = response_checksum(bytes);
    if expected != bytes[0] {
        return Err(PacketError::BadChecksum {
            expected,
            actual: bytes[0],
        });
    }

    Ok(ResponsePackage {
        checksum: bytes[0],
        message_id: bytes[1],
        host: bytes[2],
        action: Action::from(bytes[3]),
        id: bytes[4],
        content: bytes[RESPONSE_HEADER_SIZE..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, Fault};

    #[test]
    fn test_request_checksum_covers_everything_after_first_byte() {
        let request = RequestPackage::new(0, Action::SetDevice, 3).with_args(vec![1, 0]);
        let bytes = encode_request(&request).unwrap();
        assert_eq!(bytes, vec![0x08, 0x00, 0x02, 0x03, 0x02, 0x01, 0x00]);
        assert_eq!(bytes.len(), request.wire_size());
    }

    #[test]
    fn test_decode_request() {
        let bytes = [0x08, 0x00, 0x02, 0x03, 0x02, 0x01, 0x00];
        let request = decode_request(&bytes).unwrap();
        assert_eq!(request.host, 0);
        assert_eq!(request.action, Action::SetDevice);
        assert_eq!(request.id, 3);
        assert_eq!(request.args, vec![1, 0]);
    }

    #[test]
    fn test_decode_request_bad_checksum() {
        let bytes = [0x09, 0x00, 0x02, 0x03, 0x02, 0x01, 0x00];
        let err = decode_request(&bytes).unwrap_err();
        assert_eq!(err, PacketError::BadChecksum { expected: 0x08, actual: 0x09 });
        assert_eq!(err.error_code(), ErrorCode::BadChecksum);
    }

    #[test]
    fn test_every_flipped_request_byte_is_rejected() {
        let request = RequestPackage::new(2, Action::SetDevice, 3).with_args(vec![1, 0]);
        let bytes = encode_request(&request).unwrap();
        for i in 0..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= 0x01;
            let err = decode_request(&corrupt).unwrap_err();
            if i == 4 {
                // argSize grows past the buffer.
                assert_eq!(err, PacketError::Truncated { declared: 8, actual: 7 });
            } else {
                assert!(matches!(err, PacketError::BadChecksum { .. }), "byte {}: {:?}", i, err);
            }
        }
    }

    #[test]
    fn test_decode_request_rejects_oversized_before_reading_args() {
        let bytes = [0x00, 0x00, 0x01, 0x00, 0xFF];
        let err = decode_request(&bytes).unwrap_err();
        assert!(matches!(err, PacketError::InvalidSize { size, .. } if size == 5 + 0xFF));
    }

    #[test]
    fn test_decode_request_too_short() {
        let err = decode_request(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, PacketError::InvalidSize { size: 2, .. }));
    }

    #[test]
    fn test_decode_request_truncated() {
        let err = decode_request(&[0x00, 0x00, 0x01, 0x00, 0x03, 0x01]).unwrap_err();
        assert_eq!(err, PacketError::Truncated { declared: 8, actual: 6 });
    }

    #[test]
    fn test_encode_request_rejects_long_args() {
        let request = RequestPackage::new(0, Action::CreateDevice, 0).with_args(vec![0; 22]);
        assert!(matches!(
            encode_request(&request),
            Err(PacketError::PayloadTooLarge { size: 22, .. })
        ));
    }

    #[test]
    fn test_response_checksum_skips_message_id() {
        let mut response =
            ResponsePackage::new(1, Action::GetDevice, 2).with_content(vec![0x10, 0x00, 0, 0]);
        response.message_id = 7;
        let first = encode_response(&response).unwrap();
        response.message_id = 200;
        let second = encode_response(&response).unwrap();

        assert_eq!(first[0], second[0]);
        assert_eq!(first[0], 1 + 0x03 + 2 + 4 + 0x10);
        assert_eq!(first[1], 7);
        assert_eq!(second[1], 200);

        let decoded = decode_response(&second).unwrap();
        assert_eq!(decoded.message_id, 200);
        assert_eq!(decoded.values(), vec![0x10, 0]);
    }

    #[test]
    fn test_error_response_on_the_wire() {
        let response = ResponsePackage::error(0, 9, Fault::new(ErrorCode::Timeout, 4));
        let bytes = encode_response(&response).unwrap();
        assert_eq!(&bytes[1..], &[0, 0, 0xF0, 9, 2, 11, 4]);

        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded.fault(), Some(Fault::new(ErrorCode::Timeout, 4)));
    }

    #[test]
    fn test_every_flipped_response_byte_is_rejected() {
        let mut response =
            ResponsePackage::new(1, Action::GetDevice, 2).with_content(vec![0x10, 0x00, 0, 0]);
        response.message_id = 7;
        let bytes = encode_response(&response).unwrap();
        for i in 0..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= 0x01;
            let result = decode_response(&corrupt);
            match i {
                // messageId is outside the checksum.
                1 => assert_eq!(result.map(|r| r.message_id), Ok(6)),
                // contentSize grows past the buffer.
                5 => assert_eq!(result, Err(PacketError::Truncated { declared: 11, actual: 10 })),
                _ => assert!(
                    matches!(result, Err(PacketError::BadChecksum { .. })),
                    "byte {}: {:?}",
                    i,
                    result
                ),
            }
        }
    }

    #[test]
    fn test_checksum_wraps() {
        let request = RequestPackage::new(0xFF, Action::Unknown(0xFF), 0xFF);
        let bytes = encode_request(&request).unwrap();
        assert_eq!(bytes[0], 0xFFu8.wrapping_mul(3));
        assert!(decode_request(&bytes).is_ok());
    }
}
