//! Host transports for the r2 device router.
//!
//! A transport frames bytes into requests, hands them to a
//! [`RequestHandler`] and frames the responses back:
//!
//! - [`SerialAdapter`]: header, size byte, packet; byte-driven state machine
//!   with an inter-byte timeout.
//! - [`I2cSlaveAdapter`] and [`I2cMailbox`]: bus callbacks only buffer;
//!   requests execute on the node loop.
//!
//! The host side of both links lives here too: [`HostSession`] for serial and
//! [`I2cMasterClient`] for I2C.
//!
//! # Example
//!
//! ```rust
//! use r2_packet::{encode_request, Action, RequestPackage};
//! use r2_router::{ManualClock, MemoryStorage, Router, RouterConfig, RouterContext, SimBoard};
//! use r2_transport::{frame, SerialAdapter};
//!
//! let clock = ManualClock::new();
//! let ctx = RouterContext::new(
//!     RouterConfig::default(),
//!     Box::new(SimBoard::new()),
//!     Box::new(MemoryStorage::new()),
//!     clock.shared(),
//! )
//! .unwrap();
//! let mut router = Router::new(ctx);
//! let mut serial = SerialAdapter::new(clock.shared(), 1000);
//!
//! let request = encode_request(&RequestPackage::new(0, Action::Ping, 0)).unwrap();
//! let reply = serial.receive(&frame(&request), &mut router);
//! assert!(!reply.is_empty());
//! ```

mod client;
mod error;
mod handler;
mod i2c;
mod serial;

pub use client::*;
pub use error::*;
pub use handler::*;
pub use i2c::*;
pub use serial::*;
