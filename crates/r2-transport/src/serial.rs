//! Serial transport, node side.
//!
//! Frames in both directions are the fixed header, one size byte and the
//! packet:
//!
//! ```text
//! +------+------+------+------+-------------------+
//! | 0xF0 | 0x0F | 0xF1 | size | packet[0..size]   |
//! +------+------+------+------+-------------------+
//! ```
//!
//! [`SerialAdapter`] consumes bytes as they arrive and produces the framed
//! reply once a request is complete.

use bytes::{BufMut, BytesMut};
use log::{debug, trace, warn};
use r2_metrics::{metric_defs, transport_labels};
use r2_metrics::metrics::counter;
use r2_packet::{
    decode_request, encode_response, ErrorCode, Fault, PacketError, ResponsePackage,
    MAX_REQUEST_SIZE, MIN_REQUEST_SIZE, SERIAL_HEADER,
};
use r2_router::SharedClock;

use crate::handler::RequestHandler;

const TRANSPORT: &str = "serial";

/// Where the adapter is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialState {
    /// Matching the header; `matched` bytes of it seen so far.
    AwaitingHeader {
        /// Header bytes matched.
        matched: usize,
    },
    /// Header complete, next byte is the size.
    AwaitingSize,
    /// Collecting `size` bytes of request.
    AccumulatingBody {
        /// Declared request size.
        size: usize,
    },
    /// A complete request is buffered.
    Ready,
}

/// Prefix a packet with the serial header and its size.
pub fn frame(packet: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(SERIAL_HEADER.len() + 1 + packet.len());
    buf.put_slice(&SERIAL_HEADER);
    buf.put_u8(packet.len() as u8);
    buf.put_slice(packet);
    buf.to_vec()
}

/// Encode and frame a response.
///
/// A response that can't be encoded is replaced by an error response from
/// the handler, which always encodes.
pub fn frame_response(response: &ResponsePackage, handler: &mut dyn RequestHandler) -> Vec<u8> {
    match encode_response(response) {
        Ok(bytes) => frame(&bytes),
        Err(err) => {
            warn!("response for {} not encodable: {}", response.action, err);
            let fallback = handler.reject(Fault::from(&err));
            frame(&encode_response(&fallback).unwrap_or_default())
        }
    }
}

/// Byte-driven serial framing state machine.
pub struct SerialAdapter {
    state: SerialState,
    body: BytesMut,
    clock: SharedClock,
    byte_timeout_ms: u64,
    last_byte_at: u64,
}

impl std::fmt::Debug for SerialAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialAdapter")
            .field("state", &self.state)
            .field("buffered", &self.body.len())
            .field("byte_timeout_ms", &self.byte_timeout_ms)
            .finish()
    }
}

impl SerialAdapter {
    /// Create an adapter that abandons frames idle for `byte_timeout_ms`.
    pub fn new(clock: SharedClock, byte_timeout_ms: u64) -> Self {
        SerialAdapter {
            state: SerialState::AwaitingHeader { matched: 0 },
            body: BytesMut::with_capacity(MAX_REQUEST_SIZE),
            clock,
            byte_timeout_ms,
            last_byte_at: 0,
        }
    }

    /// Current framing state.
    pub fn state(&self) -> SerialState {
        self.state
    }

    /// Whether a frame is partially received.
    pub fn in_frame(&self) -> bool {
        self.state != SerialState::AwaitingHeader { matched: 0 }
    }

    fn reset(&mut self) {
        self.state = SerialState::AwaitingHeader { matched: 0 };
        self.body.clear();
    }

    /// Abandon a frame that has been idle too long.
    ///
    /// Returns the framed `SerialTimeout` reply when one was produced.
    pub fn poll(&mut self, handler: &mut dyn RequestHandler) -> Option<Vec<u8>> {
        if !self.in_frame() {
            return None;
        }
        let now = self.clock.millis();
        if now.saturating_sub(self.last_byte_at) <= self.byte_timeout_ms {
            return None;
        }
        debug!("serial frame timed out in state {:?}", self.state);
        let info = self.body.len() as u8;
        self.reset();
        Some(self.fail(handler, Fault::new(ErrorCode::SerialTimeout, info)))
    }

    /// Consume received bytes. Returns the framed replies to transmit.
    pub fn receive(&mut self, bytes: &[u8], handler: &mut dyn RequestHandler) -> Vec<u8> {
        let mut output = Vec::new();
        if let Some(reply) = self.poll(handler) {
            output.extend_from_slice(&reply);
        }
        for &byte in bytes {
            if let Some(reply) = self.push(byte, handler) {
                output.extend_from_slice(&reply);
            }
        }
        self.last_byte_at = self.clock.millis();
        output
    }

    fn push(&mut self, byte: u8, handler: &mut dyn RequestHandler) -> Option<Vec<u8>> {
        match self.state {
            SerialState::AwaitingHeader { matched } => {
                if byte == SERIAL_HEADER[matched] {
                    let matched = matched + 1;
                    self.state = if matched == SERIAL_HEADER.len() {
                        SerialState::AwaitingSize
                    } else {
                        SerialState::AwaitingHeader { matched }
                    };
                } else {
                    trace!("serial header mismatch at {}: 0x{:02X}", matched, byte);
                    let matched = usize::from(byte == SERIAL_HEADER[0]);
                    self.state = SerialState::AwaitingHeader { matched };
                }
                None
            }
            SerialState::AwaitingSize => {
                let size = byte as usize;
                if !(MIN_REQUEST_SIZE..=MAX_REQUEST_SIZE).contains(&size) {
                    self.reset();
                    return Some(self.fail(handler, Fault::new(ErrorCode::InvalidRequestSize, byte)));
                }
                self.body.clear();
                self.state = SerialState::AccumulatingBody { size };
                None
            }
            SerialState::AccumulatingBody { size } => {
                self.body.put_u8(byte);
                if self.body.len() < size {
                    return None;
                }
                self.state = SerialState::Ready;
                Some(self.dispatch(handler))
            }
            // `dispatch` always leaves Ready before returning.
            SerialState::Ready => {
                self.reset();
                self.push(byte, handler)
            }
        }
    }

    fn dispatch(&mut self, handler: &mut dyn RequestHandler) -> Vec<u8> {
        let decoded = decode_request(&self.body);
        self.reset();
        match decoded {
            Ok(request) => {
                counter!(
                    metric_defs::TRANSPORT_FRAMES_RX.name,
                    &transport_labels(TRANSPORT, None)
                )
                .increment(1);
                let response = handler.handle(&request);
                frame_response(&response, handler)
            }
            Err(err) => self.fail_packet(handler, &err),
        }
    }

    fn fail_packet(&mut self, handler: &mut dyn RequestHandler, err: &PacketError) -> Vec<u8> {
        debug!("serial request rejected: {}", err);
        self.fail(handler, Fault::from(err))
    }

    fn fail(&mut self, handler: &mut dyn RequestHandler, fault: Fault) -> Vec<u8> {
        counter!(
            metric_defs::TRANSPORT_FRAME_ERRORS.name,
            &transport_labels(TRANSPORT, Some(&fault.code))
        )
        .increment(1);
        let response = handler.reject(fault);
        frame_response(&response, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2_packet::{decode_response, encode_request, Action, RequestPackage};
    use r2_router::ManualClock;

    #[derive(Default)]
    struct Echo {
        handled: Vec<RequestPackage>,
        rejected: Vec<Fault>,
    }

    impl RequestHandler for Echo {
        fn handle(&mut self, request: &RequestPackage) -> ResponsePackage {
            self.handled.push(request.clone());
            ResponsePackage::new(request.host, request.action, request.id)
        }

        fn reject(&mut self, fault: Fault) -> ResponsePackage {
            self.rejected.push(fault);
            ResponsePackage::error(0, 0, fault)
        }
    }

    fn adapter(clock: &ManualClock) -> SerialAdapter {
        SerialAdapter::new(clock.shared(), 1000)
    }

    fn unframe(bytes: &[u8]) -> ResponsePackage {
        assert_eq!(&bytes[..3], &SERIAL_HEADER);
        assert_eq!(bytes[3] as usize, bytes.len() - 4);
        decode_response(&bytes[4..]).unwrap()
    }

    #[test]
    fn test_complete_frame_is_dispatched() {
        let clock = ManualClock::with_step(0);
        let mut serial = adapter(&clock);
        let mut handler = Echo::default();

        let request = RequestPackage::new(0, Action::GetDevice, 3).with_args(vec![1]);
        let bytes = frame(&encode_request(&request).unwrap());

        let (first, rest) = bytes.split_at(5);
        assert!(serial.receive(first, &mut handler).is_empty());
        assert_eq!(serial.state(), SerialState::AccumulatingBody { size: 6 });

        let reply = serial.receive(rest, &mut handler);
        assert_eq!(unframe(&reply).action, Action::GetDevice);
        assert_eq!(handler.handled.len(), 1);
        assert_eq!(serial.state(), SerialState::AwaitingHeader { matched: 0 });
    }

    #[test]
    fn test_garbage_before_header_is_skipped() {
        let clock = ManualClock::with_step(0);
        let mut serial = adapter(&clock);
        let mut handler = Echo::default();

        let mut bytes = vec![0x00, 0xF0, 0x00, 0xF0];
        bytes.extend(frame(&encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap()));
        let reply = serial.receive(&bytes, &mut handler);
        assert_eq!(unframe(&reply).action, Action::Ping);
    }

    #[test]
    fn test_size_out_of_range() {
        let clock = ManualClock::with_step(0);
        let mut serial = adapter(&clock);
        let mut handler = Echo::default();

        let mut bytes = SERIAL_HEADER.to_vec();
        bytes.push((MAX_REQUEST_SIZE + 1) as u8);
        let reply = serial.receive(&bytes, &mut handler);
        assert_eq!(
            unframe(&reply).fault(),
            Some(Fault::new(ErrorCode::InvalidRequestSize, (MAX_REQUEST_SIZE + 1) as u8))
        );
        assert!(!serial.in_frame());

        let mut bytes = SERIAL_HEADER.to_vec();
        bytes.push(2);
        let reply = serial.receive(&bytes, &mut handler);
        assert_eq!(unframe(&reply).fault().map(|f| f.code), Some(ErrorCode::InvalidRequestSize));
    }

    #[test]
    fn test_bad_checksum_is_reported() {
        let clock = ManualClock::with_step(0);
        let mut serial = adapter(&clock);
        let mut handler = Echo::default();

        let mut packet = encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap();
        packet[0] ^= 0xFF;
        let reply = serial.receive(&frame(&packet), &mut handler);
        assert_eq!(unframe(&reply).fault().map(|f| f.code), Some(ErrorCode::BadChecksum));
        assert!(handler.handled.is_empty());
    }

    #[test]
    fn test_stalled_frame_times_out() {
        let clock = ManualClock::with_step(0);
        let mut serial = adapter(&clock);
        let mut handler = Echo::default();

        let bytes = frame(&encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap());
        serial.receive(&bytes[..6], &mut handler);
        assert!(serial.poll(&mut handler).is_none());

        clock.advance(1001);
        let reply = serial.poll(&mut handler).expect("timeout reply");
        assert_eq!(unframe(&reply).fault(), Some(Fault::new(ErrorCode::SerialTimeout, 2)));
        assert!(!serial.in_frame());

        // The rest of the stale frame is ignored as header garbage.
        assert!(serial.receive(&bytes[6..], &mut handler).is_empty());
        assert!(handler.handled.is_empty());
    }
}
