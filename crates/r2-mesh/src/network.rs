//! The radio mesh as seen by a session.
//!
//! [`MeshNetwork`] is the capability the session manager needs from a mesh
//! stack: pump the network, read and write typed messages, look up routed
//! nodes and keep a slave's address alive. Real radios and [`SimMeshHub`]
//! endpoints both implement it.
//!
//! [`SimMeshHub`]: crate::SimMeshHub

/// Mesh address of the master node.
pub const MASTER_ADDRESS: u16 = 0;

/// One message delivered by the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshFrame {
    /// Mesh address of the sender.
    pub from: u16,
    /// Message type (`'M'`, `'P'`, ...).
    pub kind: u8,
    /// Message bytes.
    pub payload: Vec<u8>,
}

impl MeshFrame {
    /// A frame from `from`.
    pub fn new(from: u16, kind: u8, payload: impl Into<Vec<u8>>) -> Self {
        MeshFrame {
            from,
            kind,
            payload: payload.into(),
        }
    }
}

/// A node's handle on the mesh.
pub trait MeshNetwork {
    /// Pump the network layer. Called on every loop iteration and on every
    /// iteration of a bounded wait.
    fn update(&mut self);

    /// Serve address requests. Only meaningful on the master.
    fn dhcp(&mut self) {}

    /// Take the next message, if any.
    fn read(&mut self) -> Option<MeshFrame>;

    /// Send a message to a mesh address. Returns whether it was acknowledged.
    fn write(&mut self, to: u16, kind: u8, payload: &[u8]) -> bool;

    /// Mesh address of a routed node.
    fn address_of(&self, node: u8) -> Option<u16>;

    /// Node ids currently in the routing table.
    fn nodes(&self) -> Vec<u8>;

    /// Whether this node is still reachable from the master.
    fn check_connection(&mut self) -> bool;

    /// Ask the master for a fresh address, waiting at most `timeout_ms`.
    fn renew_address(&mut self, timeout_ms: u64) -> bool;

    /// Enter low-power mode for `cycles` watchdog cycles; `0xFF` sleeps
    /// until a message arrives. Returns whether the radio slept.
    fn sleep_node(&mut self, cycles: u8) -> bool;
}
