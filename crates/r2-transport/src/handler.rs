//! The seam between a transport and whatever executes requests.

use r2_packet::{Fault, RequestPackage, ResponsePackage};
use r2_router::Router;

/// Executes framed requests on behalf of a transport.
pub trait RequestHandler {
    /// Execute a decoded request.
    fn handle(&mut self, request: &RequestPackage) -> ResponsePackage;

    /// Answer a frame that could not be decoded.
    fn reject(&mut self, fault: Fault) -> ResponsePackage;
}

impl RequestHandler for Router {
    fn handle(&mut self, request: &RequestPackage) -> ResponsePackage {
        self.execute(request)
    }

    fn reject(&mut self, fault: Fault) -> ResponsePackage {
        Router::reject(self, fault)
    }
}
