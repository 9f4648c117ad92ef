//! Device router node.
//!
//! A node owns a table of devices bound to board ports, a persisted sleep
//! mode and a last-error record. [`Router`] executes decoded requests against
//! that state; transports and the mesh layer feed it and carry its responses.
//!
//! # Example
//!
//! ```rust
//! use r2_packet::{Action, RequestPackage};
//! use r2_router::{ManualClock, MemoryStorage, Router, RouterConfig, RouterContext, SimBoard};
//!
//! let board = SimBoard::new();
//! let ctx = RouterContext::new(
//!     RouterConfig::default(),
//!     Box::new(board.clone()),
//!     Box::new(MemoryStorage::new()),
//!     ManualClock::new().shared(),
//! )
//! .unwrap();
//! let mut router = Router::new(ctx);
//!
//! let create = RequestPackage::new(0, Action::CreateDevice, 1).with_args(vec![2, 5]);
//! router.execute(&create);
//! router.execute(&RequestPackage::new(0, Action::SetDevice, 1).with_args(vec![1]));
//! assert_eq!(board.digital_output(5), Some(true));
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod device;
pub mod diagnostics;
pub mod dispatcher;
pub mod hal;
pub mod registry;
pub mod remote;
pub mod sleep;
pub mod storage;

pub use clock::{Clock, ManualClock, SharedClock, StdClock};
pub use config::{ConfigError, I2cConfig, MeshConfig, RouterConfig, SleepConfig};
pub use context::{Role, RouterContext};
pub use device::{Device, DeviceError, DeviceState, DeviceType};
pub use diagnostics::Diagnostics;
pub use dispatcher::Router;
pub use hal::{Board, Dht11Reading, PinMode, SensorFault, SimBoard};
pub use registry::{DeviceRegistry, PortOwner, Reading};
pub use remote::{LocalNodes, RemoteNodes};
pub use sleep::{SleepSchedule, SleepState};
pub use storage::{FileStorage, MemoryStorage, NonVolatileStorage, StorageError, STORAGE_SIZE};
