//! A router joined to the mesh in the role its address gives it.

use std::sync::Arc;

use parking_lot::Mutex;
use r2_packet::{Fault, RequestPackage, ResponsePackage};
use r2_router::{Role, Router};
use r2_transport::RequestHandler;

use crate::master::MeshMaster;
use crate::network::MeshNetwork;
use crate::slave::MeshSlave;

/// The role-specific half of a mesh node.
#[derive(Debug)]
pub enum MeshSession<N> {
    /// Address 0.
    Master(MeshMaster<N>),
    /// Every other address.
    Slave(MeshSlave<N>),
}

/// A router plus its mesh session.
///
/// As a [`RequestHandler`] a node serves its host transport: on the master,
/// requests for other nodes are forwarded through the mesh.
#[derive(Debug)]
pub struct Node<N> {
    router: Router,
    session: MeshSession<N>,
}

impl<N: MeshNetwork> Node<N> {
    /// Join `network` with the role selected by the router's address.
    pub fn new(router: Router, network: N) -> Self {
        let ctx = router.context();
        let clock = ctx.clock.clone();
        let config = ctx.config.mesh.clone();
        let labels = ctx.labels.clone();
        let session = match ctx.role {
            Role::Master => MeshSession::Master(MeshMaster::new(network, clock, config, labels)),
            Role::Slave => MeshSession::Slave(MeshSlave::new(network, clock, config, labels)),
        };
        Node { router, session }
    }

    /// The router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Mutable access to the router.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// The mesh session.
    pub fn session(&self) -> &MeshSession<N> {
        &self.session
    }

    /// Mutable access to the mesh session.
    pub fn session_mut(&mut self) -> &mut MeshSession<N> {
        &mut self.session
    }

    /// One run-loop iteration of whichever role this node has.
    pub fn tick(&mut self) {
        match &mut self.session {
            MeshSession::Master(master) => master.poll(self.router.context_mut()),
            MeshSession::Slave(slave) => {
                slave.tick(&mut self.router);
            }
        }
    }
}

impl<N: MeshNetwork> RequestHandler for Node<N> {
    fn handle(&mut self, request: &RequestPackage) -> ResponsePackage {
        match &mut self.session {
            MeshSession::Master(master) => self.router.execute_with(request, master),
            MeshSession::Slave(_) => self.router.execute(request),
        }
    }

    fn reject(&mut self, fault: Fault) -> ResponsePackage {
        self.router.reject(fault)
    }
}

/// Something that runs a loop iteration when the mesh is pumped.
///
/// Lets a simulated master drive in-process slaves while it waits.
pub trait MeshPeer: Send {
    /// One loop iteration.
    fn tick(&mut self);
}

impl<N: MeshNetwork + Send> MeshPeer for Node<N> {
    fn tick(&mut self) {
        Node::tick(self);
    }
}

/// A peer that is also inspected from elsewhere.
impl<P: MeshPeer> MeshPeer for Arc<Mutex<P>> {
    fn tick(&mut self) {
        self.lock().tick();
    }
}
