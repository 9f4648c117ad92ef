//! Serial transport, host side.
//!
//! [`SerialFrameDecoder`] pulls framed responses out of an arbitrary byte
//! stream. [`HostSession`] sends requests over any `Read + Write` link and
//! resends them when the node answers with a retryable error.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BytesMut};
use log::{debug, info, trace};
use r2_packet::{
    decode_response, encode_request, PacketError, RequestPackage, ResponsePackage,
    MAX_RESPONSE_SIZE, SERIAL_HEADER,
};
use r2_router::SharedClock;

use crate::error::TransportError;
use crate::serial::frame;

/// Accumulates bytes and yields framed responses.
#[derive(Debug, Default)]
pub struct SerialFrameDecoder {
    buffer: BytesMut,
}

impl SerialFrameDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        SerialFrameDecoder {
            buffer: BytesMut::with_capacity(2 * MAX_RESPONSE_SIZE),
        }
    }

    /// Add received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next complete response, `None` if more bytes are needed.
    pub fn decode(&mut self) -> Option<Result<ResponsePackage, PacketError>> {
        // Discard anything before a full header.
        loop {
            let found = self
                .buffer
                .windows(SERIAL_HEADER.len())
                .position(|window| window == SERIAL_HEADER);
            match found {
                Some(0) => break,
                Some(offset) => {
                    trace!("skipping {} bytes before serial header", offset);
                    self.buffer.advance(offset);
                }
                None => {
                    let keep = self.buffer.len().min(SERIAL_HEADER.len() - 1);
                    let drop = self.buffer.len() - keep;
                    self.buffer.advance(drop);
                    return None;
                }
            }
        }

        let header = SERIAL_HEADER.len();
        let size = *self.buffer.get(header)? as usize;
        if size > MAX_RESPONSE_SIZE {
            self.buffer.advance(header + 1);
            return Some(Err(PacketError::InvalidSize {
                size,
                min: 0,
                max: MAX_RESPONSE_SIZE,
            }));
        }
        if self.buffer.len() < header + 1 + size {
            return None;
        }
        self.buffer.advance(header + 1);
        let body = self.buffer.split_to(size);
        Some(decode_response(&body))
    }
}

/// Resend policy for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends after the first attempt.
    pub retries: u32,
    /// Base delay; attempt `n` waits `base_delay_ms * (2n + 1)`.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 7,
            base_delay_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Delay before resend number `attempt` (0-based).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms * (2 * attempt as u64 + 1)
    }
}

/// Default longest wait for one reply, in milliseconds.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5000;

/// A host talking to one node over a serial link.
pub struct HostSession<S> {
    link: S,
    decoder: SerialFrameDecoder,
    retry: RetryPolicy,
    clock: SharedClock,
    reply_timeout_ms: u64,
}

impl<S: Read + Write> HostSession<S> {
    /// Session over `link`.
    ///
    /// Each reply wait is bounded by the session clock. A link that reports
    /// `WouldBlock` is polled until then; one that reports `TimedOut` ends
    /// the wait early. A link whose `read` blocks without a timeout of its
    /// own is only checked between reads.
    pub fn new(link: S, clock: SharedClock) -> Self {
        HostSession {
            link,
            decoder: SerialFrameDecoder::new(),
            retry: RetryPolicy::default(),
            clock,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the reply timeout.
    pub fn with_reply_timeout(mut self, timeout_ms: u64) -> Self {
        self.reply_timeout_ms = timeout_ms;
        self
    }

    /// The underlying link.
    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    /// Send once and wait for one response.
    pub fn send_once(&mut self, request: &RequestPackage) -> Result<ResponsePackage, TransportError> {
        let packet = encode_request(request)?;
        self.decoder.clear();
        self.link.write_all(&frame(&packet))?;
        self.link.flush()?;

        let deadline = self.clock.millis() + self.reply_timeout_ms;
        let mut buf = [0u8; 64];
        loop {
            if let Some(decoded) = self.decoder.decode() {
                return Ok(decoded?);
            }
            if self.clock.millis() >= deadline {
                debug!(
                    "no reply from node {} within {} ms",
                    request.host, self.reply_timeout_ms
                );
                return Err(TransportError::Timeout);
            }
            match self.link.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(read) => self.decoder.push(&buf[..read]),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    self.clock.delay_ms(1);
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => return Err(TransportError::Timeout),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Send, resending on retryable error responses and link faults.
    ///
    /// After the last retry the final error response is returned as is; a
    /// link fault is returned as an error.
    pub fn send(&mut self, request: &RequestPackage) -> Result<ResponsePackage, TransportError> {
        let mut attempt = 0;
        loop {
            let outcome = self.send_once(request);
            let retryable = match &outcome {
                Ok(response) => response.fault().is_some_and(|f| f.code.is_retryable()),
                Err(err) => err.is_retryable(),
            };
            if !retryable || attempt >= self.retry.retries {
                return outcome;
            }
            let delay = self.retry.delay_ms(attempt);
            match &outcome {
                Ok(response) => debug!(
                    "{} to node {} failed with {:?}, retrying in {} ms",
                    request.action,
                    request.host,
                    response.fault(),
                    delay
                ),
                Err(err) => debug!(
                    "{} to node {} failed: {}, retrying in {} ms",
                    request.action, request.host, err, delay
                ),
            }
            if attempt == 3 {
                info!("{} to node {} still failing, retrying", request.action, request.host);
            }
            self.clock.delay_ms(delay);
            attempt += 1;
        }
    }
}
