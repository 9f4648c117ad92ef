//! In-memory mesh.
//!
//! [`SimMeshHub`] holds one inbox per address and the master's routing
//! table. Every joined node gets a [`SimMeshEndpoint`] implementing
//! [`MeshNetwork`]. Faults are injected on the hub: failed writes, lost
//! routes and radios that refuse to sleep.
//!
//! Slaves can run on their own threads, or be attached to the master's
//! endpoint as [`MeshPeer`]s so that they tick whenever the master pumps
//! the network, which keeps single-threaded tests deterministic.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::network::{MeshFrame, MeshNetwork, MASTER_ADDRESS};
use crate::node::MeshPeer;

#[derive(Debug, Default)]
struct HubState {
    inboxes: HashMap<u16, VecDeque<MeshFrame>>,
    /// Node id to address, as the master's DHCP sees it.
    routes: BTreeMap<u8, u16>,
    /// Writes still to fail, per sending address.
    failing_writes: HashMap<u16, usize>,
    /// Addresses whose radio refuses to sleep.
    sleepless: Vec<u16>,
    /// Addresses whose renewal requests go unanswered.
    unrenewable: Vec<u16>,
    sleeps: HashMap<u16, Vec<u8>>,
    renewals: HashMap<u16, usize>,
}

/// Shared state of a simulated mesh.
#[derive(Debug, Clone, Default)]
pub struct SimMeshHub {
    state: Arc<Mutex<HubState>>,
}

impl SimMeshHub {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join as `node`. The master (node 0) gets address 0, slaves get their
    /// node id as address and are routed.
    pub fn join(&self, node: u8) -> SimMeshEndpoint {
        let address = node as u16;
        let mut state = self.state.lock();
        state.inboxes.entry(address).or_default();
        if address != MASTER_ADDRESS {
            state.routes.insert(node, address);
        }
        SimMeshEndpoint {
            hub: self.clone(),
            node,
            address,
            peers: Vec::new(),
        }
    }

    /// Fail the next `count` writes sent from `node`.
    pub fn fail_writes(&self, node: u8, count: usize) {
        self.state.lock().failing_writes.insert(node as u16, count);
    }

    /// Drop `node` from the master's routing table.
    pub fn drop_route(&self, node: u8) {
        self.state.lock().routes.remove(&node);
    }

    /// Make renewals from `node` fail (or succeed again).
    pub fn set_unrenewable(&self, node: u8, unrenewable: bool) {
        let mut state = self.state.lock();
        state.unrenewable.retain(|a| *a != node as u16);
        if unrenewable {
            state.unrenewable.push(node as u16);
        }
    }

    /// Make the radio of `node` refuse to sleep (or sleep again).
    pub fn set_sleepless(&self, node: u8, sleepless: bool) {
        let mut state = self.state.lock();
        state.sleepless.retain(|a| *a != node as u16);
        if sleepless {
            state.sleepless.push(node as u16);
        }
    }

    /// Deliver a frame directly into the inbox of `to`.
    pub fn inject(&self, to: u16, frame: MeshFrame) {
        self.state
            .lock()
            .inboxes
            .entry(to)
            .or_default()
            .push_back(frame);
    }

    /// Frames waiting for `address`.
    pub fn pending(&self, address: u16) -> usize {
        self.state.lock().inboxes.get(&address).map_or(0, VecDeque::len)
    }

    /// Cycle arguments of every sleep `node` entered.
    pub fn sleeps(&self, node: u8) -> Vec<u8> {
        self.state
            .lock()
            .sleeps
            .get(&(node as u16))
            .cloned()
            .unwrap_or_default()
    }

    /// Address renewals requested by `node`.
    pub fn renewals(&self, node: u8) -> usize {
        self.state
            .lock()
            .renewals
            .get(&(node as u16))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `node` is in the routing table.
    pub fn is_routed(&self, node: u8) -> bool {
        self.state.lock().routes.contains_key(&node)
    }
}

/// One node's view of a [`SimMeshHub`].
pub struct SimMeshEndpoint {
    hub: SimMeshHub,
    node: u8,
    address: u16,
    peers: Vec<Box<dyn MeshPeer>>,
}

impl std::fmt::Debug for SimMeshEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimMeshEndpoint")
            .field("node", &self.node)
            .field("address", &self.address)
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl SimMeshEndpoint {
    /// Node id of this endpoint.
    pub fn node(&self) -> u8 {
        self.node
    }

    /// Mesh address of this endpoint.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Tick `peer` every time this endpoint is updated.
    pub fn attach(&mut self, peer: impl MeshPeer + 'static) {
        self.peers.push(Box::new(peer));
    }
}

impl MeshNetwork for SimMeshEndpoint {
    fn update(&mut self) {
        // Peers lock the hub themselves.
        for peer in &mut self.peers {
            peer.tick();
        }
    }

    fn read(&mut self) -> Option<MeshFrame> {
        self.hub
            .state
            .lock()
            .inboxes
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front)
    }

    fn write(&mut self, to: u16, kind: u8, payload: &[u8]) -> bool {
        let mut state = self.hub.state.lock();
        if let Some(remaining) = state.failing_writes.get_mut(&self.address) {
            if *remaining > 0 {
                *remaining -= 1;
                trace!(from = self.address, to, "simulated write failure");
                return false;
            }
        }
        let Some(inbox) = state.inboxes.get_mut(&to) else {
            return false;
        };
        inbox.push_back(MeshFrame::new(self.address, kind, payload));
        true
    }

    fn address_of(&self, node: u8) -> Option<u16> {
        self.hub.state.lock().routes.get(&node).copied()
    }

    fn nodes(&self) -> Vec<u8> {
        self.hub.state.lock().routes.keys().copied().collect()
    }

    fn check_connection(&mut self) -> bool {
        self.address == MASTER_ADDRESS || self.hub.is_routed(self.node)
    }

    fn renew_address(&mut self, _timeout_ms: u64) -> bool {
        let mut state = self.hub.state.lock();
        *state.renewals.entry(self.address).or_default() += 1;
        if state.unrenewable.contains(&self.address) {
            return false;
        }
        state.routes.insert(self.node, self.address);
        true
    }

    fn sleep_node(&mut self, cycles: u8) -> bool {
        let mut state = self.hub.state.lock();
        if state.sleepless.contains(&self.address) {
            return false;
        }
        state.sleeps.entry(self.address).or_default().push(cycles);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2_packet::MESH_MESSAGE;

    #[test]
    fn test_join_routes_slaves() {
        let hub = SimMeshHub::new();
        let master = hub.join(0);
        let _slave = hub.join(3);
        assert_eq!(master.nodes(), vec![3]);
        assert_eq!(master.address_of(3), Some(3));
        assert_eq!(master.address_of(0), None);
    }

    #[test]
    fn test_write_and_read() {
        let hub = SimMeshHub::new();
        let mut master = hub.join(0);
        let mut slave = hub.join(2);
        assert!(master.write(2, MESH_MESSAGE, &[1, 2, 3]));
        assert!(!master.write(9, MESH_MESSAGE, &[1]));
        assert_eq!(
            slave.read(),
            Some(MeshFrame::new(MASTER_ADDRESS, MESH_MESSAGE, vec![1, 2, 3]))
        );
        assert_eq!(slave.read(), None);
    }

    #[test]
    fn test_injected_write_failures() {
        let hub = SimMeshHub::new();
        let _master = hub.join(0);
        let mut slave = hub.join(1);
        hub.fail_writes(1, 1);
        assert!(!slave.write(MASTER_ADDRESS, MESH_MESSAGE, &[0]));
        assert!(slave.write(MASTER_ADDRESS, MESH_MESSAGE, &[0]));
        assert_eq!(hub.pending(MASTER_ADDRESS), 1);
    }

    #[test]
    fn test_lost_route_is_renewed() {
        let hub = SimMeshHub::new();
        let mut slave = hub.join(1);
        hub.drop_route(1);
        assert!(!slave.check_connection());
        assert!(slave.renew_address(500));
        assert!(slave.check_connection());
        assert_eq!(hub.renewals(1), 1);
    }
}
