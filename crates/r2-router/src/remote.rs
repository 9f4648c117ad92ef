//! Access to other nodes, as seen by the dispatcher.

use r2_packet::{ErrorCode, Fault, RequestPackage, ResponsePackage};

/// Nodes reachable from this one.
///
/// The mesh master implements this over the radio; a node without a mesh
/// uses [`LocalNodes`].
pub trait RemoteNodes {
    /// Forward a request to `request.host` and wait for its response.
    fn send(&mut self, request: &RequestPackage) -> Result<ResponsePackage, Fault>;

    /// Whether `node` is reachable.
    fn node_available(&mut self, node: u8) -> bool;

    /// Addresses of every reachable node.
    fn nodes(&mut self) -> Vec<u8>;
}

/// No other nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalNodes;

impl RemoteNodes for LocalNodes {
    fn send(&mut self, _request: &RequestPackage) -> Result<ResponsePackage, Fault> {
        Err(Fault::new(ErrorCode::NodeNotAvailable, 0))
    }

    fn node_available(&mut self, _node: u8) -> bool {
        false
    }

    fn nodes(&mut self) -> Vec<u8> {
        Vec::new()
    }
}
