//! Mesh session manager for the r2 device router.
//!
//! The master (node 0) forwards requests for other nodes over the radio
//! mesh with [`MeshMaster`]; every other node runs [`MeshSlave`], which
//! keeps its address alive, answers requests and sleeps when configured to.
//! [`Node`] binds a [`Router`](r2_router::Router) to the session matching
//! its address and serves host transports as a
//! [`RequestHandler`](r2_transport::RequestHandler).
//!
//! # Example
//!
//! ```rust
//! use r2_mesh::{Node, SimMeshHub};
//! use r2_packet::{Action, RequestPackage};
//! use r2_router::{
//!     ManualClock, MemoryStorage, NonVolatileStorage, Router, RouterConfig, RouterContext,
//!     SimBoard,
//! };
//! use r2_transport::RequestHandler;
//!
//! let clock = ManualClock::new();
//! let router = |node: u8| {
//!     let mut storage = MemoryStorage::new();
//!     storage.write(0, node).unwrap();
//!     let ctx = RouterContext::new(
//!         RouterConfig::default(),
//!         Box::new(SimBoard::new()),
//!         Box::new(storage),
//!         clock.shared(),
//!     )
//!     .unwrap();
//!     Router::new(ctx)
//! };
//!
//! let hub = SimMeshHub::new();
//! let mut endpoint = hub.join(0);
//! endpoint.attach(Node::new(router(1), hub.join(1)));
//! let mut master = Node::new(router(0), endpoint);
//!
//! let response = master.handle(&RequestPackage::new(1, Action::Ping, 0));
//! assert_eq!(response.host, 1);
//! assert_eq!(response.action, Action::Ping);
//! ```

mod error;
mod master;
mod network;
mod node;
mod sim;
mod slave;

pub use error::*;
pub use master::*;
pub use network::*;
pub use node::*;
pub use sim::*;
pub use slave::*;
