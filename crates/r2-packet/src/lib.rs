//! Device router packets
//!
//! Every node of the device router speaks the same two packet shapes: a
//! request that names a target host, an action and a device id, and a
//! response that echoes host, action and id and carries up to
//! `MAX_CONTENT_SIZE` bytes of content. Both carry a single-byte wrapping
//! checksum.
//!
//! # Example
//!
//! ```rust
//! use r2_packet::{decode_request, encode_request, Action, RequestPackage};
//!
//! let request = RequestPackage::new(0, Action::GetDevice, 1);
//! let bytes = encode_request(&request).unwrap();
//! let decoded = decode_request(&bytes).unwrap();
//! assert_eq!(decoded.action, Action::GetDevice);
//! ```

mod action;
mod codec;
mod constants;
mod error;
mod packet;

pub use action::*;
pub use codec::*;
pub use constants::*;
pub use error::*;
pub use packet::*;
