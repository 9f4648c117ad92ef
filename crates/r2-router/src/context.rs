//! Everything a node owns: address, board, storage, devices, sleep state and
//! diagnostics.

use r2_metrics::NodeLabels;
use r2_packet::{Fault, DEVICE_HOST_LOCAL, NODE_ID_STORAGE_ADDRESS};
use tracing::info;

use crate::clock::SharedClock;
use crate::config::RouterConfig;
use crate::diagnostics::Diagnostics;
use crate::hal::Board;
use crate::registry::DeviceRegistry;
use crate::sleep::{SleepSchedule, SleepState};
use crate::storage::{NonVolatileStorage, StorageError};

/// Role of a node, fixed at startup from its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Address 0: answers the host and forwards to slaves.
    Master,
    /// Any other address.
    Slave,
}

impl Role {
    /// The role a node with `node_id` takes.
    pub fn for_node(node_id: u8) -> Self {
        if node_id == DEVICE_HOST_LOCAL {
            Role::Master
        } else {
            Role::Slave
        }
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }
}

/// Node state passed to the dispatcher and the mesh session.
pub struct RouterContext {
    /// Address loaded at startup.
    pub node_id: u8,
    /// Role derived from `node_id`.
    pub role: Role,
    /// Timing configuration.
    pub config: RouterConfig,
    /// Hardware.
    pub board: Box<dyn Board>,
    /// Non-volatile storage.
    pub storage: Box<dyn NonVolatileStorage>,
    /// Time source.
    pub clock: SharedClock,
    /// Device table.
    pub registry: DeviceRegistry,
    /// Last failure.
    pub diagnostics: Diagnostics,
    /// Persisted sleep mode.
    pub sleep: SleepState,
    /// Sleep pause timer.
    pub schedule: SleepSchedule,
    /// Metric labels of this node.
    pub labels: NodeLabels,
    initialized: bool,
    message_counter: u8,
}

impl std::fmt::Debug for RouterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterContext")
            .field("node_id", &self.node_id)
            .field("role", &self.role)
            .field("devices", &self.registry.len())
            .field("sleep", &self.sleep)
            .field("diagnostics", &self.diagnostics)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl RouterContext {
    /// Load the node address and sleep mode from storage.
    pub fn new(
        config: RouterConfig,
        board: Box<dyn Board>,
        mut storage: Box<dyn NonVolatileStorage>,
        clock: SharedClock,
    ) -> Result<Self, StorageError> {
        let node_id = storage.read(NODE_ID_STORAGE_ADDRESS)?;
        let sleep = SleepState::load(storage.as_mut())?;
        let role = Role::for_node(node_id);
        info!(node_id, role = role.as_str(), ?sleep, "router context loaded");

        Ok(RouterContext {
            node_id,
            role,
            config,
            board,
            storage,
            clock,
            registry: DeviceRegistry::new(),
            diagnostics: Diagnostics::new(),
            sleep,
            schedule: SleepSchedule::new(),
            labels: NodeLabels::new(node_id, role.as_str()),
            initialized: false,
            message_counter: 0,
        })
    }

    /// Current time from the node clock.
    pub fn now(&self) -> u64 {
        self.clock.millis()
    }

    /// Whether `Initialize` has run since the last `Reset` or boot.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop every device and the last failure.
    pub(crate) fn reinitialize(&mut self, initialized: bool) {
        self.registry.clear(self.board.as_mut());
        self.diagnostics.clear();
        self.initialized = initialized;
    }

    /// Next rolling response identifier.
    pub fn next_message_id(&mut self) -> u8 {
        self.message_counter = self.message_counter.wrapping_add(1);
        self.message_counter
    }

    /// Record a failure in diagnostics.
    pub fn fail(&mut self, fault: Fault) {
        self.diagnostics.set(fault);
    }

    /// Drive the status indicator, touching the board only on change.
    pub fn set_status(&mut self, on: bool) {
        if self.diagnostics.set_status(on) {
            self.board.set_status(on);
        }
    }

    /// Persist a new node address. It applies from the next start.
    pub fn store_node_id(&mut self, node_id: u8) -> Result<(), StorageError> {
        if self.storage.update(NODE_ID_STORAGE_ADDRESS, node_id)? {
            info!(node_id, "node address persisted");
        }
        Ok(())
    }

    /// `[sum, count]` over node address, sleep byte and live devices.
    pub fn integrity(&self) -> [u8; 2] {
        let sleep_byte = if self.sleep.enabled { self.sleep.cycles } else { 0 };
        let sum = self
            .node_id
            .wrapping_add(sleep_byte)
            .wrapping_add(self.registry.checksum());
        [sum, self.registry.len() as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hal::SimBoard;
    use crate::storage::MemoryStorage;

    fn context(storage: MemoryStorage) -> RouterContext {
        RouterContext::new(
            RouterConfig::default(),
            Box::new(SimBoard::new()),
            Box::new(storage),
            ManualClock::new().shared(),
        )
        .unwrap()
    }

    #[test]
    fn test_role_from_stored_address() {
        let storage = MemoryStorage::new();
        assert_eq!(context(storage.clone()).role, Role::Master);

        let mut writer = storage.clone();
        writer.write(NODE_ID_STORAGE_ADDRESS, 4).unwrap();
        let ctx = context(storage);
        assert_eq!(ctx.node_id, 4);
        assert_eq!(ctx.role, Role::Slave);
        assert_eq!(ctx.labels.role, "slave");
    }

    #[test]
    fn test_message_id_wraps() {
        let mut ctx = context(MemoryStorage::new());
        ctx.message_counter = 0xFE;
        assert_eq!(ctx.next_message_id(), 0xFF);
        assert_eq!(ctx.next_message_id(), 0);
    }

    #[test]
    fn test_integrity_includes_sleep_byte() {
        let mut ctx = context(MemoryStorage::new());
        assert_eq!(ctx.integrity(), [0, 0]);
        ctx.sleep.set(ctx.storage.as_mut(), true, 3).unwrap();
        assert_eq!(ctx.integrity(), [3, 0]);
    }
}
