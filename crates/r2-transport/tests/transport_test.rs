//! Host-to-node exchanges over each transport, with a real router behind
//! the node side.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use r2_packet::{Action, ErrorCode, RequestPackage, DEVICE_TYPE_ANALOG_INPUT};
use r2_router::{ManualClock, MemoryStorage, Router, RouterConfig, RouterContext, SimBoard};
use r2_transport::{
    HostSession, I2cBus, I2cMailbox, I2cMasterClient, I2cSlaveAdapter, RetryPolicy,
    SerialAdapter, TransportError,
};

fn router(clock: &ManualClock) -> (Router, SimBoard) {
    let board = SimBoard::new();
    let ctx = RouterContext::new(
        RouterConfig::default(),
        Box::new(board.clone()),
        Box::new(MemoryStorage::new()),
        clock.shared(),
    )
    .unwrap();
    (Router::new(ctx), board)
}

// ============================================================================
// Serial
// ============================================================================

/// A serial line with the node adapter running on the far end.
struct Loopback {
    serial: SerialAdapter,
    router: Router,
    inbound: VecDeque<u8>,
    /// Corrupt this many outgoing frames before delivering them.
    corrupt: usize,
}

impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = buf.to_vec();
        if self.corrupt > 0 {
            self.corrupt -= 1;
            // Flip a byte of the request packet, after header and size.
            bytes[5] ^= 0x40;
        }
        let reply = self.serial.receive(&bytes, &mut self.router);
        self.inbound.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbound.pop_front().unwrap_or(0);
        }
        Ok(n)
    }
}

fn serial_session(corrupt: usize) -> (HostSession<Loopback>, SimBoard, ManualClock) {
    let clock = ManualClock::with_step(0);
    let (router, board) = router(&clock);
    let link = Loopback {
        serial: SerialAdapter::new(clock.shared(), 1000),
        router,
        inbound: VecDeque::new(),
        corrupt,
    };
    (HostSession::new(link, clock.shared()), board, clock)
}

#[test]
fn test_serial_create_and_read() {
    let (mut session, board, _) = serial_session(0);
    board.set_analog_input(14, 0x0234);

    let create = RequestPackage::new(0, Action::CreateDevice, 0)
        .with_args(vec![DEVICE_TYPE_ANALOG_INPUT, 14]);
    assert_eq!(session.send(&create).unwrap().action, Action::CreateDevice);

    let response = session.send(&RequestPackage::new(0, Action::GetDevice, 0)).unwrap();
    assert_eq!(response.values(), vec![0x0234, 0]);
}

#[test]
fn test_serial_retries_corrupted_frames() {
    let (mut session, _, clock) = serial_session(2);
    let response = session.send(&RequestPackage::new(0, Action::Ping, 0)).unwrap();
    assert_eq!(response.action, Action::Ping);
    // Two resends: 250 ms then 750 ms.
    assert_eq!(clock.peek(), 1000);
}

#[test]
fn test_serial_gives_up_after_retries() {
    let (session, _, _) = serial_session(10);
    let mut session = session.with_retry(RetryPolicy {
        retries: 2,
        base_delay_ms: 1,
    });
    let response = session.send(&RequestPackage::new(0, Action::Ping, 0)).unwrap();
    assert_eq!(response.fault().map(|f| f.code), Some(ErrorCode::BadChecksum));
    assert_eq!(session.link_mut().corrupt, 7);
}

#[test]
fn test_serial_non_retryable_error_returns_immediately() {
    let (mut session, _, clock) = serial_session(0);
    let response = session.send(&RequestPackage::new(0, Action::GetDevice, 5)).unwrap();
    assert_eq!(response.fault().map(|f| f.code), Some(ErrorCode::NoDeviceFound));
    assert_eq!(clock.peek(), 0);
}

/// A link whose far end never answers: reads either would block or yield
/// line noise.
struct Silent {
    noise: bool,
}

impl Write for Silent {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Silent {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.noise {
            buf[0] = 0x55;
            return Ok(1);
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "nothing yet"))
    }
}

#[test]
fn test_reply_wait_is_bounded_by_session_clock() {
    for noise in [false, true] {
        let clock = ManualClock::new();
        let mut session =
            HostSession::new(Silent { noise }, clock.shared()).with_reply_timeout(300);
        let err = session
            .send_once(&RequestPackage::new(0, Action::Ping, 0))
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout), "{:?}", err);
        let elapsed = clock.peek();
        assert!((300..320).contains(&elapsed), "noise {}: elapsed {}", noise, elapsed);
    }
}

// ============================================================================
// I2C
// ============================================================================

/// A bus with one slave whose loop ticks before every master read.
struct SimBus {
    mailbox: I2cMailbox,
    slave: I2cSlaveAdapter,
    router: Router,
    /// Master reads to answer before the slave loop picks the request up.
    busy_reads: usize,
}

impl I2cBus for SimBus {
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), TransportError> {
        assert_eq!(address, self.slave.address());
        self.mailbox.on_receive(data);
        Ok(())
    }

    fn read(&mut self, _address: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
        } else {
            self.slave.poll(&mut self.router);
        }
        let chunk = self.mailbox.on_request(buf.len());
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

fn i2c_client(busy_reads: usize) -> (I2cMasterClient<SimBus>, SimBoard) {
    let clock = ManualClock::new();
    let (router, board) = router(&clock);
    let mailbox = I2cMailbox::new();
    let bus = SimBus {
        mailbox: mailbox.clone(),
        slave: I2cSlaveAdapter::new(0x04, mailbox),
        router,
        busy_reads,
    };
    (I2cMasterClient::new(bus, 0x04, clock.shared(), 200), board)
}

#[test]
fn test_i2c_exchange_waits_for_ready() {
    let (mut client, board) = i2c_client(5);
    board.set_digital_input(3, true);

    let create = RequestPackage::new(0, Action::CreateDevice, 2).with_args(vec![1, 3]);
    assert_eq!(client.execute(&create).unwrap().action, Action::CreateDevice);

    let response = client.execute(&RequestPackage::new(0, Action::GetDevice, 2)).unwrap();
    assert_eq!(response.values(), vec![1, 0]);
}

#[test]
fn test_i2c_slave_never_ready_times_out() {
    let (mut client, _) = i2c_client(usize::MAX);
    let err = client.execute(&RequestPackage::new(0, Action::Ping, 0)).unwrap_err();
    assert!(matches!(err, TransportError::Timeout));
}
