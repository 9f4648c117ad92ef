//! I2C transport.
//!
//! The slave side is split in two. [`I2cMailbox`] is what the bus controller
//! callbacks touch: it only copies bytes and flips flags. [`I2cSlaveAdapter`]
//! runs on the node loop, takes the pending request out of the mailbox,
//! executes it and queues the encoded reply.
//!
//! A master poll is answered with `0x00` while nothing is queued. Once a
//! reply is queued the first poll returns the ready sentinel `0xFF`, and the
//! following reads return the reply size and then the reply bytes.

use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use r2_metrics::{metric_defs, transport_labels};
use r2_metrics::metrics::counter;
use r2_packet::{
    decode_request, decode_response, encode_request, encode_response, Fault, RequestPackage,
    ResponsePackage, I2C_NOTHING_QUEUED, I2C_READY_TO_SEND,
};
use r2_router::SharedClock;

use crate::error::TransportError;
use crate::handler::RequestHandler;

const TRANSPORT: &str = "i2c";

// ============================================================================
// Slave
// ============================================================================

#[derive(Debug, Default)]
struct MailboxState {
    pending: Option<Vec<u8>>,
    reply: Vec<u8>,
    reply_cursor: usize,
    reply_ready: bool,
    ready_sent: bool,
}

impl MailboxState {
    fn clear_reply(&mut self) {
        self.reply.clear();
        self.reply_cursor = 0;
        self.reply_ready = false;
        self.ready_sent = false;
    }
}

/// Buffers shared between the bus callbacks and the node loop.
#[derive(Debug, Clone, Default)]
pub struct I2cMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl I2cMailbox {
    /// Empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus callback: the master wrote `data`.
    ///
    /// A new request drops any reply the master never collected.
    pub fn on_receive(&self, data: &[u8]) {
        let mut state = self.state.lock();
        state.clear_reply();
        if data.is_empty() {
            return;
        }
        state.pending = Some(data.to_vec());
    }

    /// Bus callback: the master reads up to `max` bytes.
    pub fn on_request(&self, max: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        if !state.reply_ready {
            return vec![I2C_NOTHING_QUEUED];
        }
        if !state.ready_sent {
            state.ready_sent = true;
            return vec![I2C_READY_TO_SEND];
        }
        let start = state.reply_cursor;
        let end = (start + max).min(state.reply.len());
        let chunk = state.reply[start..end].to_vec();
        state.reply_cursor = end;
        if end == state.reply.len() {
            state.clear_reply();
        }
        chunk
    }

    /// Whether a request is waiting for the node loop.
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Whether a reply is waiting for the master.
    pub fn has_reply(&self) -> bool {
        self.state.lock().reply_ready
    }

    fn take_pending(&self) -> Option<Vec<u8>> {
        self.state.lock().pending.take()
    }

    fn set_reply(&self, packet: &[u8]) {
        let mut state = self.state.lock();
        state.clear_reply();
        state.reply.push(packet.len() as u8);
        state.reply.extend_from_slice(packet);
        state.reply_ready = true;
    }
}

/// Node-loop half of the I2C slave.
#[derive(Debug, Clone)]
pub struct I2cSlaveAdapter {
    mailbox: I2cMailbox,
    address: u8,
}

impl I2cSlaveAdapter {
    /// Adapter answering on `address` through `mailbox`.
    pub fn new(address: u8, mailbox: I2cMailbox) -> Self {
        I2cSlaveAdapter { mailbox, address }
    }

    /// Bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The mailbox to hand to the bus controller.
    pub fn mailbox(&self) -> &I2cMailbox {
        &self.mailbox
    }

    /// Execute a pending request, if any. Returns whether one was handled.
    pub fn poll(&mut self, handler: &mut dyn RequestHandler) -> bool {
        let Some(bytes) = self.mailbox.take_pending() else {
            return false;
        };
        let response = match decode_request(&bytes) {
            Ok(request) => {
                counter!(
                    metric_defs::TRANSPORT_FRAMES_RX.name,
                    &transport_labels(TRANSPORT, None)
                )
                .increment(1);
                handler.handle(&request)
            }
            Err(err) => {
                debug!("i2c request rejected: {}", err);
                let fault = Fault::from(&err);
                counter!(
                    metric_defs::TRANSPORT_FRAME_ERRORS.name,
                    &transport_labels(TRANSPORT, Some(&fault.code))
                )
                .increment(1);
                handler.reject(fault)
            }
        };
        let packet = match encode_response(&response) {
            Ok(packet) => packet,
            Err(err) => encode_response(&handler.reject(Fault::from(&err))).unwrap_or_default(),
        };
        trace!("i2c reply queued: {} bytes", packet.len());
        self.mailbox.set_reply(&packet);
        true
    }
}

// ============================================================================
// Master
// ============================================================================

/// An I2C bus as seen by a master.
pub trait I2cBus {
    /// Write bytes to the slave at `address`.
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Read into `buf` from the slave at `address`. Returns the byte count.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Sends requests to an I2C slave and collects the replies.
pub struct I2cMasterClient<B> {
    bus: B,
    address: u8,
    clock: SharedClock,
    ready_timeout_ms: u64,
}

impl<B: I2cBus> I2cMasterClient<B> {
    /// Client for the slave at `address`.
    pub fn new(bus: B, address: u8, clock: SharedClock, ready_timeout_ms: u64) -> Self {
        I2cMasterClient {
            bus,
            address,
            clock,
            ready_timeout_ms,
        }
    }

    /// The underlying bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Write a request and wait for its reply.
    pub fn execute(&mut self, request: &RequestPackage) -> Result<ResponsePackage, TransportError> {
        let packet = encode_request(request)?;
        self.bus.write(self.address, &packet)?;

        let deadline = self.clock.millis() + self.ready_timeout_ms;
        let mut byte = [0u8; 1];
        loop {
            self.read_exact(&mut byte)?;
            if byte[0] == I2C_READY_TO_SEND {
                break;
            }
            if self.clock.millis() >= deadline {
                debug!("i2c slave 0x{:02X} never became ready", self.address);
                return Err(TransportError::Timeout);
            }
        }

        self.read_exact(&mut byte)?;
        let mut body = vec![0u8; byte[0] as usize];
        self.read_exact(&mut body)?;
        Ok(decode_response(&body)?)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let actual = self.bus.read(self.address, buf)?;
        if actual != buf.len() {
            return Err(TransportError::ShortTransfer {
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2_packet::{Action, ErrorCode, MIN_RESPONSE_SIZE};

    struct Counter(u8);

    impl RequestHandler for Counter {
        fn handle(&mut self, request: &RequestPackage) -> ResponsePackage {
            self.0 += 1;
            ResponsePackage::new(request.host, request.action, request.id).with_content(vec![self.0])
        }

        fn reject(&mut self, fault: Fault) -> ResponsePackage {
            ResponsePackage::error(0, 0, fault)
        }
    }

    #[test]
    fn test_poll_before_reply_returns_nothing_queued() {
        let mailbox = I2cMailbox::new();
        assert_eq!(mailbox.on_request(32), vec![I2C_NOTHING_QUEUED]);

        let request = encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap();
        mailbox.on_receive(&request);
        assert!(mailbox.has_pending());
        // The callback never executes the request itself.
        assert_eq!(mailbox.on_request(32), vec![I2C_NOTHING_QUEUED]);
    }

    #[test]
    fn test_reply_sequence() {
        let mailbox = I2cMailbox::new();
        let mut slave = I2cSlaveAdapter::new(0x04, mailbox.clone());
        let mut handler = Counter(0);

        mailbox.on_receive(&encode_request(&RequestPackage::new(0, Action::Ping, 2)).unwrap());
        assert!(slave.poll(&mut handler));
        assert!(!slave.poll(&mut handler));

        assert_eq!(mailbox.on_request(32), vec![I2C_READY_TO_SEND]);
        let size = mailbox.on_request(1);
        assert_eq!(size, vec![(MIN_RESPONSE_SIZE + 1) as u8]);
        let body = mailbox.on_request(size[0] as usize);
        let response = decode_response(&body).unwrap();
        assert_eq!(response.content, vec![1]);
        assert!(!mailbox.has_reply());
        assert_eq!(mailbox.on_request(32), vec![I2C_NOTHING_QUEUED]);
    }

    #[test]
    fn test_new_request_drops_uncollected_reply() {
        let mailbox = I2cMailbox::new();
        let mut slave = I2cSlaveAdapter::new(0x04, mailbox.clone());
        let mut handler = Counter(0);

        mailbox.on_receive(&encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap());
        slave.poll(&mut handler);
        assert!(mailbox.has_reply());
        mailbox.on_receive(&[1, 2, 3]);
        assert!(!mailbox.has_reply());

        slave.poll(&mut handler);
        mailbox.on_request(1);
        mailbox.on_request(1);
        let body = mailbox.on_request(32);
        let response = decode_response(&body).unwrap();
        assert_eq!(response.fault().map(|f| f.code), Some(ErrorCode::InvalidRequestSize));
    }
}
