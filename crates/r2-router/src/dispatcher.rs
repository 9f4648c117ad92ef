//! Action dispatch.
//!
//! [`Router::execute`] turns one request into exactly one response. Every
//! failure on the way, local or on a forwarded exchange, is recorded in
//! diagnostics and answered with an `Error` response carrying `[code, info]`.

use r2_metrics::metric_defs;
use r2_metrics::metrics::{counter, gauge, histogram};
use r2_packet::{
    Action, ErrorCode, Fault, RequestPackage, ResponsePackage, NODE_ID_STORAGE_ADDRESS,
    SLEEP_UNTIL_MESSAGE_RECEIVED,
};
use tracing::{debug, trace};

use crate::context::{Role, RouterContext};
use crate::remote::{LocalNodes, RemoteNodes};

/// A node's request executor.
#[derive(Debug)]
pub struct Router {
    ctx: RouterContext,
}

impl Router {
    /// Wrap a loaded context.
    pub fn new(ctx: RouterContext) -> Self {
        Router { ctx }
    }

    /// Node state.
    pub fn context(&self) -> &RouterContext {
        &self.ctx
    }

    /// Mutable node state.
    pub fn context_mut(&mut self) -> &mut RouterContext {
        &mut self.ctx
    }

    /// Node address.
    pub fn node_id(&self) -> u8 {
        self.ctx.node_id
    }

    /// Execute a request on a node with no other nodes reachable.
    pub fn execute(&mut self, request: &RequestPackage) -> ResponsePackage {
        self.execute_with(request, &mut LocalNodes)
    }

    /// Execute a request, forwarding it through `remote` when it names
    /// another node.
    pub fn execute_with(
        &mut self,
        request: &RequestPackage,
        remote: &mut dyn RemoteNodes,
    ) -> ResponsePackage {
        let started = self.ctx.now();
        counter!(
            metric_defs::ROUTER_REQUESTS.name,
            &self.ctx.labels.for_action(&request.action)
        )
        .increment(1);
        debug!(
            host = request.host,
            action = %request.action,
            id = request.id,
            args = request.args.len(),
            "executing request"
        );

        let forward = request.host != self.ctx.node_id && !request.action.is_topology_query();
        let result = if forward {
            self.forward(request, remote)
        } else {
            self.dispatch(request, remote).map(|mut response| {
                response.message_id = self.ctx.next_message_id();
                response
            })
        };

        let response = match result {
            Ok(response) => response,
            Err(fault) => self.reject_request(request, fault),
        };

        histogram!(
            metric_defs::ROUTER_REQUEST_TIME.name,
            &self.ctx.labels.base()
        )
        .record(self.ctx.now().saturating_sub(started) as f64);
        response
    }

    /// Answer a request that could not be framed or decoded.
    pub fn reject(&mut self, fault: Fault) -> ResponsePackage {
        let request = RequestPackage::new(self.ctx.node_id, Action::Error, 0);
        self.reject_request(&request, fault)
    }

    fn reject_request(&mut self, request: &RequestPackage, fault: Fault) -> ResponsePackage {
        self.ctx.fail(fault);
        counter!(
            metric_defs::ROUTER_ERRORS.name,
            &self.ctx.labels.for_code(fault.code)
        )
        .increment(1);
        let mut response = ResponsePackage::error(request.host, request.id, fault);
        response.message_id = self.ctx.next_message_id();
        response
    }

    fn forward(
        &mut self,
        request: &RequestPackage,
        remote: &mut dyn RemoteNodes,
    ) -> Result<ResponsePackage, Fault> {
        if self.ctx.role != Role::Master {
            return Err(Fault::new(ErrorCode::RoutingThroughNonMaster, request.host));
        }
        trace!(host = request.host, action = %request.action, "forwarding request");
        let response = remote.send(request)?;
        if let Some(fault) = response.fault() {
            // Remote failures are recorded here too so the host sees them
            // through this node's diagnostics.
            self.ctx.fail(fault);
        }
        Ok(response)
    }

    fn dispatch(
        &mut self,
        request: &RequestPackage,
        remote: &mut dyn RemoteNodes,
    ) -> Result<ResponsePackage, Fault> {
        let ctx = &mut self.ctx;
        let reply = ResponsePackage::new(request.host, request.action, request.id);
        let invalid = || Fault::new(ErrorCode::InvalidArguments, request.id);

        let response = match request.action {
            Action::CreateDevice => {
                let (&type_code, args) = request.args.split_first().ok_or_else(invalid)?;
                ctx.registry
                    .create(ctx.board.as_mut(), request.id, type_code, args)
                    .map_err(|e| Fault::from(&e))?;
                record_device_count(ctx);
                reply
            }
            Action::DeleteDevice => {
                ctx.registry.delete(ctx.board.as_mut(), request.id);
                record_device_count(ctx);
                reply
            }
            Action::SetDevice => {
                let value = match request.args.as_slice() {
                    [] => return Err(invalid()),
                    [low] => *low as u16,
                    [low, high, ..] => u16::from_le_bytes([*low, *high]),
                };
                ctx.registry
                    .write(ctx.board.as_mut(), request.id, value)
                    .map_err(|e| Fault::from(&e))?;
                reply
            }
            Action::GetDevice => {
                let reading = ctx
                    .registry
                    .read(ctx.board.as_mut(), request.id, &request.args)
                    .map_err(|e| Fault::from(&e))?;
                if let Some(err) = &reading.fault {
                    ctx.fail(Fault::from(err));
                }
                let content: Vec<u8> = reading
                    .values
                    .iter()
                    .flat_map(|value| value.to_le_bytes())
                    .collect();
                reply.with_content(content)
            }
            Action::Initialize => {
                ctx.reinitialize(true);
                record_device_count(ctx);
                ResponsePackage::new(request.host, Action::InitializationOk, request.id)
            }
            Action::Reset => {
                ctx.reinitialize(false);
                record_device_count(ctx);
                reply
            }
            Action::SetNodeId => {
                ctx.store_node_id(request.id).map_err(|e| Fault::from(&e))?;
                ResponsePackage::new(request.id, Action::SetNodeId, request.id)
            }
            Action::CheckNode => {
                let available =
                    request.host == ctx.node_id || remote.node_available(request.host);
                reply.with_content(vec![available as u8])
            }
            Action::GetNodes => reply.with_content(remote.nodes()),
            Action::Ping | Action::PingSlave => reply,
            Action::Sleep => {
                let enabled = request.arg(0).ok_or_else(invalid)? != 0;
                let cycles = request.arg(1).unwrap_or(SLEEP_UNTIL_MESSAGE_RECEIVED);
                ctx.sleep
                    .set(ctx.storage.as_mut(), enabled, cycles)
                    .map_err(|e| Fault::from(&e))?;
                reply.with_content(ctx.sleep.to_content().to_vec())
            }
            Action::CheckSleepState => reply.with_content(ctx.sleep.to_content().to_vec()),
            Action::PauseSleep => {
                let seconds = request.arg(0).unwrap_or(ctx.config.sleep.wake_pause_secs);
                let seconds = seconds.min(ctx.config.sleep.max_pause_secs);
                let now = ctx.clock.millis();
                ctx.schedule.pause(now, seconds, ctx.config.sleep.max_pause_secs);
                reply.with_content(vec![seconds])
            }
            Action::CheckIntegrity => reply.with_content(ctx.integrity().to_vec()),
            Action::InitializationOk
            | Action::Error
            | Action::NoMessageRead
            | Action::Unknown(_) => {
                return Err(Fault::new(ErrorCode::UnknownAction, request.action.into()));
            }
        };
        Ok(response)
    }

    /// Address persisted for the next start.
    pub fn stored_node_id(&mut self) -> Result<u8, Fault> {
        self.ctx
            .storage
            .read(NODE_ID_STORAGE_ADDRESS)
            .map_err(|e| Fault::from(&e))
    }
}

fn record_device_count(ctx: &RouterContext) {
    gauge!(metric_defs::ROUTER_DEVICES.name, &ctx.labels.base())
        .set(ctx.registry.len() as f64);
}
