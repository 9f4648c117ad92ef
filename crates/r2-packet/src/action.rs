//! Action codes carried by requests and responses.

use crate::constants::*;

/// The operation a request asks for, or the kind of reply a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Create a device.
    CreateDevice,
    /// Write a device.
    SetDevice,
    /// Read a device.
    GetDevice,
    /// Initialize the router.
    Initialize,
    /// Initialization succeeded.
    InitializationOk,
    /// Persist a new node address.
    SetNodeId,
    /// Ask whether a node is reachable.
    CheckNode,
    /// List routed nodes.
    GetNodes,
    /// Keep-alive ping.
    Ping,
    /// Enable or disable sleep.
    Sleep,
    /// Read the sleep state.
    CheckSleepState,
    /// Defer sleeping.
    PauseSleep,
    /// Reset to an uninitialized state.
    Reset,
    /// Checksum of configuration and devices.
    CheckIntegrity,
    /// Delete a device.
    DeleteDevice,
    /// Error reply.
    Error,
    /// Nothing was read (internal).
    NoMessageRead,
    /// Master-to-slave liveness ping (internal).
    PingSlave,
    /// A code this firmware doesn't know.
    Unknown(u8),
}

impl Action {
    /// Whether this action is internal bookkeeping of the mesh layer.
    pub fn is_internal(&self) -> bool {
        matches!(self, Action::Ping | Action::NoMessageRead | Action::PingSlave)
    }

    /// Topology queries are answered by the master itself instead of being
    /// forwarded to the node named in `host`.
    pub fn is_topology_query(&self) -> bool {
        matches!(self, Action::CheckNode | Action::GetNodes)
    }
}

impl From<u8> for Action {
    fn from(code: u8) -> Self {
        match code {
            ACTION_CREATE_DEVICE => Action::CreateDevice,
            ACTION_SET_DEVICE => Action::SetDevice,
            ACTION_GET_DEVICE => Action::GetDevice,
            ACTION_INITIALIZE => Action::Initialize,
            ACTION_INITIALIZATION_OK => Action::InitializationOk,
            ACTION_SET_NODE_ID => Action::SetNodeId,
            ACTION_CHECK_NODE => Action::CheckNode,
            ACTION_GET_NODES => Action::GetNodes,
            ACTION_PING => Action::Ping,
            ACTION_SLEEP => Action::Sleep,
            ACTION_CHECK_SLEEP_STATE => Action::CheckSleepState,
            ACTION_PAUSE_SLEEP => Action::PauseSleep,
            ACTION_RESET => Action::Reset,
            ACTION_CHECK_INTEGRITY => Action::CheckIntegrity,
            ACTION_DELETE_DEVICE => Action::DeleteDevice,
            ACTION_ERROR => Action::Error,
            ACTION_NO_MESSAGE_READ => Action::NoMessageRead,
            ACTION_PING_SLAVE => Action::PingSlave,
            _ => Action::Unknown(code),
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        match action {
            Action::CreateDevice => ACTION_CREATE_DEVICE,
            Action::SetDevice => ACTION_SET_DEVICE,
            Action::GetDevice => ACTION_GET_DEVICE,
            Action::Initialize => ACTION_INITIALIZE,
            Action::InitializationOk => ACTION_INITIALIZATION_OK,
            Action::SetNodeId => ACTION_SET_NODE_ID,
            Action::CheckNode => ACTION_CHECK_NODE,
            Action::GetNodes => ACTION_GET_NODES,
            Action::Ping => ACTION_PING,
            Action::Sleep => ACTION_SLEEP,
            Action::CheckSleepState => ACTION_CHECK_SLEEP_STATE,
            Action::PauseSleep => ACTION_PAUSE_SLEEP,
            Action::Reset => ACTION_RESET,
            Action::CheckIntegrity => ACTION_CHECK_INTEGRITY,
            Action::DeleteDevice => ACTION_DELETE_DEVICE,
            Action::Error => ACTION_ERROR,
            Action::NoMessageRead => ACTION_NO_MESSAGE_READ,
            Action::PingSlave => ACTION_PING_SLAVE,
            Action::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Unknown(code) => write!(f, "Unknown(0x{:02X})", code),
            other => write!(f, "{:?}", other),
        }
    }
}
