//! Master side of the mesh session.
//!
//! Every forwarded request goes through the same exchange:
//!
//! 1. Read clean: drain the receive queue. Pings are answered and dropped;
//!    anything else means an earlier exchange never completed and the send
//!    is aborted with a synchronization fault.
//! 2. Resolve the node in the routing table and write the request once.
//! 3. Wait for a reply until the read timeout, pumping the network on every
//!    iteration and answering pings. The timeout runs from the write; pings
//!    arriving meanwhile do not extend it.
//!
//! Replies carry the sender's rolling message id. A reply repeating the
//! previous accepted `(node, message id)` is a radio-level duplicate and is
//! reported instead of being handed back a second time.

use r2_metrics::metrics::{counter, histogram};
use r2_metrics::{metric_defs, MessageKind, NodeLabels};
use r2_packet::{
    decode_response, encode_request, Action, Fault, RequestPackage, ResponsePackage,
    DEVICE_HOST_LOCAL, MESH_MESSAGE, MESH_MESSAGE_NONE, MESH_MESSAGE_PING, MIN_RESPONSE_SIZE,
};
use r2_router::{MeshConfig, RemoteNodes, RouterContext, SharedClock};
use tracing::{debug, trace, warn};

use crate::error::MeshError;
use crate::network::MeshNetwork;

/// A message the master read from the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A keep-alive ping from the given node, already answered.
    Ping(u8),
    /// A protocol response.
    Response(ResponsePackage),
}

/// Mesh session of the master node.
pub struct MeshMaster<N> {
    network: N,
    clock: SharedClock,
    config: MeshConfig,
    labels: NodeLabels,
    last_accepted: Option<(u8, u8)>,
}

impl<N> std::fmt::Debug for MeshMaster<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshMaster")
            .field("config", &self.config)
            .field("last_accepted", &self.last_accepted)
            .finish()
    }
}

impl<N: MeshNetwork> MeshMaster<N> {
    /// Session over `network`.
    pub fn new(network: N, clock: SharedClock, config: MeshConfig, labels: NodeLabels) -> Self {
        MeshMaster {
            network,
            clock,
            config,
            labels,
            last_accepted: None,
        }
    }

    /// The underlying network.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Mutable access to the underlying network.
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    /// One idle iteration of the master loop.
    ///
    /// Pumps the network, answers pings and reports unsolicited responses.
    /// The status indicator is on while at least one slave is routed.
    pub fn poll(&mut self, ctx: &mut RouterContext) {
        self.network.update();
        self.network.dhcp();
        match self.read_response() {
            Ok(Some(Inbound::Response(response))) => {
                warn!(
                    host = response.host,
                    action = %response.action,
                    message_id = response.message_id,
                    "unsolicited response dropped"
                );
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "mesh read failed");
                ctx.fail(Fault::from(&err));
            }
        }
        ctx.set_status(!self.network.nodes().is_empty());
    }

    /// Forward `request` to `request.host` and wait for its reply.
    pub fn exchange(&mut self, request: &RequestPackage) -> Result<ResponsePackage, MeshError> {
        self.read_clean(request)?;

        let address = self
            .network
            .address_of(request.host)
            .ok_or_else(|| MeshError::NodeNotAvailable {
                node: request.host,
                routed: self.network.nodes().len(),
            })?;
        let packet = encode_request(request)?;
        if !self.network.write(address, MESH_MESSAGE, &packet) {
            return Err(MeshError::WriteFailed { node: request.host });
        }
        counter!(
            metric_defs::MESH_TX_MESSAGES.name,
            &self.labels.for_message(MessageKind::Message)
        )
        .increment(1);
        trace!(host = request.host, address, action = %request.action, "request written");

        let started = self.clock.millis();
        let deadline = started + self.config.read_timeout_ms;
        loop {
            match self.try_read(request.host, deadline)? {
                Inbound::Ping(_) => continue,
                Inbound::Response(response) => {
                    histogram!(metric_defs::MESH_ROUND_TRIP.name, &self.labels.base())
                        .record(self.clock.millis().saturating_sub(started) as f64);
                    return Ok(response);
                }
            }
        }
    }

    /// Actively ping a slave. Succeeds when it answers with `PingSlave`.
    pub fn ping_slave(&mut self, node: u8) -> Result<bool, MeshError> {
        let response = self.exchange(&RequestPackage::new(node, Action::PingSlave, 0))?;
        Ok(response.action == Action::PingSlave)
    }

    /// Drain the receive queue before a send.
    fn read_clean(&mut self, request: &RequestPackage) -> Result<(), MeshError> {
        loop {
            match self.read_response()? {
                None => return Ok(()),
                Some(Inbound::Ping(_)) => continue,
                Some(Inbound::Response(stale)) => {
                    debug!(
                        host = stale.host,
                        action = %stale.action,
                        "stale response in the pipe"
                    );
                    return Err(MeshError::Synchronization {
                        action: request.action,
                    });
                }
            }
        }
    }

    /// Wait until `deadline` for anything but "no message".
    fn try_read(&mut self, node: u8, deadline: u64) -> Result<Inbound, MeshError> {
        loop {
            // Checked before reading so a reply queued by the last update
            // is still picked up.
            let expired = self.clock.millis() >= deadline;
            let read = self.read_response();
            self.network.update();
            self.network.dhcp();
            match read? {
                Some(Inbound::Response(response)) => return Ok(Inbound::Response(response)),
                Some(Inbound::Ping(_)) | None if expired => break,
                Some(ping) => return Ok(ping),
                None => {}
            }
        }
        counter!(metric_defs::MESH_TIMEOUTS.name, &self.labels.base()).increment(1);
        debug!(node, timeout_ms = self.config.read_timeout_ms, "mesh read timed out");
        Err(MeshError::Timeout { node })
    }

    /// Read one message, if any.
    fn read_response(&mut self) -> Result<Option<Inbound>, MeshError> {
        loop {
            let Some(frame) = self.network.read() else {
                return Ok(None);
            };
            match frame.kind {
                MESH_MESSAGE => {
                    if frame.payload.len() < MIN_RESPONSE_SIZE {
                        return Err(MeshError::BadSizeRead {
                            size: frame.payload.len(),
                        });
                    }
                    let response = decode_response(&frame.payload)?;
                    counter!(
                        metric_defs::MESH_RX_MESSAGES.name,
                        &self.labels.for_message(MessageKind::Message)
                    )
                    .increment(1);

                    let key = (response.host, response.message_id);
                    if self.last_accepted == Some(key) {
                        counter!(metric_defs::MESH_DUPLICATES.name, &self.labels.base())
                            .increment(1);
                        return Err(MeshError::Duplicate {
                            node: response.host,
                            message_id: response.message_id,
                        });
                    }
                    self.last_accepted = Some(key);
                    return Ok(Some(Inbound::Response(response)));
                }
                MESH_MESSAGE_PING => {
                    let Some(&node) = frame.payload.first() else {
                        return Err(MeshError::NoNetworkData { from: frame.from });
                    };
                    counter!(
                        metric_defs::MESH_RX_MESSAGES.name,
                        &self.labels.for_message(MessageKind::Ping)
                    )
                    .increment(1);
                    if !self.network.write(frame.from, MESH_MESSAGE_PING, &[node]) {
                        debug!(node, "ping reply failed");
                    }
                    return Ok(Some(Inbound::Ping(node)));
                }
                MESH_MESSAGE_NONE => continue,
                kind => return Err(MeshError::UnknownMessageType { kind }),
            }
        }
    }
}

impl<N: MeshNetwork> RemoteNodes for MeshMaster<N> {
    fn send(&mut self, request: &RequestPackage) -> Result<ResponsePackage, Fault> {
        self.exchange(request).map_err(|err| {
            warn!(host = request.host, action = %request.action, error = %err, "mesh exchange failed");
            Fault::from(&err)
        })
    }

    fn node_available(&mut self, node: u8) -> bool {
        node == DEVICE_HOST_LOCAL || self.network.address_of(node).is_some()
    }

    fn nodes(&mut self) -> Vec<u8> {
        self.network.nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MeshFrame, MASTER_ADDRESS};
    use r2_packet::encode_response;
    use r2_router::ManualClock;
    use std::collections::VecDeque;

    /// A scripted network: queued frames, a routing table and a write log.
    #[derive(Default)]
    struct Script {
        inbox: VecDeque<MeshFrame>,
        /// Frames that show up after the given number of updates.
        delayed: Vec<(usize, MeshFrame)>,
        updates: usize,
        routes: Vec<(u8, u16)>,
        written: Vec<(u16, u8, Vec<u8>)>,
        fail_writes: bool,
    }

    impl MeshNetwork for Script {
        fn update(&mut self) {
            self.updates += 1;
            let updates = self.updates;
            let (due, rest): (Vec<_>, Vec<_>) =
                self.delayed.drain(..).partition(|(at, _)| *at <= updates);
            self.delayed = rest;
            self.inbox.extend(due.into_iter().map(|(_, frame)| frame));
        }

        fn read(&mut self) -> Option<MeshFrame> {
            self.inbox.pop_front()
        }

        fn write(&mut self, to: u16, kind: u8, payload: &[u8]) -> bool {
            self.written.push((to, kind, payload.to_vec()));
            !self.fail_writes
        }

        fn address_of(&self, node: u8) -> Option<u16> {
            self.routes.iter().find(|(id, _)| *id == node).map(|(_, a)| *a)
        }

        fn nodes(&self) -> Vec<u8> {
            self.routes.iter().map(|(id, _)| *id).collect()
        }

        fn check_connection(&mut self) -> bool {
            true
        }

        fn renew_address(&mut self, _timeout_ms: u64) -> bool {
            true
        }

        fn sleep_node(&mut self, _cycles: u8) -> bool {
            true
        }
    }

    fn reply(host: u8, action: Action, message_id: u8) -> MeshFrame {
        let mut response = ResponsePackage::new(host, action, 0);
        response.message_id = message_id;
        MeshFrame::new(host as u16, MESH_MESSAGE, encode_response(&response).unwrap())
    }

    fn master(script: Script) -> (MeshMaster<Script>, ManualClock) {
        let clock = ManualClock::new();
        let master = MeshMaster::new(
            script,
            clock.shared(),
            MeshConfig::default(),
            NodeLabels::new(0, "master"),
        );
        (master, clock)
    }

    fn routed() -> Script {
        Script {
            routes: vec![(3, 0o3)],
            ..Script::default()
        }
    }

    #[test]
    fn test_exchange_skips_pings() {
        let mut script = routed();
        script.delayed.push((1, MeshFrame::new(0o3, MESH_MESSAGE_PING, vec![3])));
        script.delayed.push((2, reply(3, Action::Ping, 1)));
        let (mut master, _) = master(script);

        let response = master
            .exchange(&RequestPackage::new(3, Action::Ping, 0))
            .unwrap();
        assert_eq!(response.host, 3);

        let written = &master.network().written;
        assert_eq!(written[0].0, 0o3);
        assert_eq!(written[0].1, MESH_MESSAGE);
        // The ping was echoed to its sender.
        assert_eq!(written[1], (0o3, MESH_MESSAGE_PING, vec![3]));
    }

    #[test]
    fn test_unrouted_node() {
        let (mut master, _) = master(routed());
        let err = master
            .exchange(&RequestPackage::new(9, Action::Ping, 0))
            .unwrap_err();
        assert_eq!(err, MeshError::NodeNotAvailable { node: 9, routed: 1 });
        assert!(master.network().written.is_empty());
    }

    #[test]
    fn test_stale_response_is_synchronization_fault() {
        let mut script = routed();
        script.inbox.push_back(MeshFrame::new(0o3, MESH_MESSAGE_PING, vec![3]));
        script.inbox.push_back(reply(3, Action::GetDevice, 4));
        let (mut master, _) = master(script);

        let err = master
            .exchange(&RequestPackage::new(3, Action::SetDevice, 1))
            .unwrap_err();
        assert_eq!(
            err,
            MeshError::Synchronization {
                action: Action::SetDevice
            }
        );
        // Aborted before writing the request; only the ping echo went out.
        assert_eq!(master.network().written.len(), 1);
    }

    #[test]
    fn test_write_failure_is_not_retried() {
        let mut script = routed();
        script.fail_writes = true;
        let (mut master, _) = master(script);
        let err = master
            .exchange(&RequestPackage::new(3, Action::Ping, 0))
            .unwrap_err();
        assert_eq!(err, MeshError::WriteFailed { node: 3 });
        assert_eq!(master.network().written.len(), 1);
    }

    #[test]
    fn test_timeout_is_bounded() {
        let (mut master, clock) = master(routed());
        let started = clock.peek();
        let err = master
            .exchange(&RequestPackage::new(3, Action::Ping, 0))
            .unwrap_err();
        assert_eq!(err, MeshError::Timeout { node: 3 });
        let elapsed = clock.peek() - started;
        assert!(elapsed >= 1000 && elapsed < 1100, "elapsed {}", elapsed);
        // The network was pumped while waiting.
        assert!(master.network().updates > 100);
    }

    #[test]
    fn test_pings_do_not_extend_the_timeout() {
        let mut script = routed();
        script.routes.push((4, 0o4));
        for i in 1..50 {
            script
                .delayed
                .push((i * 100, MeshFrame::new(0o4, MESH_MESSAGE_PING, vec![4])));
        }
        let (mut master, clock) = master(script);

        let started = clock.peek();
        let err = master
            .exchange(&RequestPackage::new(3, Action::Ping, 0))
            .unwrap_err();
        assert_eq!(err, MeshError::Timeout { node: 3 });
        let elapsed = clock.peek() - started;
        assert!(elapsed >= 1000 && elapsed < 1100, "elapsed {}", elapsed);

        // Pings that arrived in time were still answered.
        let echoes = master
            .network()
            .written
            .iter()
            .filter(|(to, kind, _)| *to == 0o4 && *kind == MESH_MESSAGE_PING)
            .count();
        assert!(echoes >= 5, "echoes {}", echoes);
    }

    #[test]
    fn test_duplicate_is_reported_once() {
        let mut script = routed();
        script.delayed.push((1, reply(3, Action::Ping, 8)));
        let (mut master, _) = master(script);
        master.exchange(&RequestPackage::new(3, Action::Ping, 0)).unwrap();

        // The radio delivers the same reply again.
        master.network_mut().inbox.push_back(reply(3, Action::Ping, 8));
        let err = master
            .exchange(&RequestPackage::new(3, Action::Ping, 0))
            .unwrap_err();
        assert_eq!(
            err,
            MeshError::Duplicate {
                node: 3,
                message_id: 8
            }
        );
    }

    #[test]
    fn test_same_message_id_from_another_node_is_accepted() {
        let mut script = routed();
        script.routes.push((4, 0o4));
        script.delayed.push((1, reply(3, Action::Ping, 8)));
        let (mut master, _) = master(script);
        master.exchange(&RequestPackage::new(3, Action::Ping, 0)).unwrap();

        master.network_mut().delayed.push((0, reply(4, Action::Ping, 8)));
        let response = master
            .exchange(&RequestPackage::new(4, Action::Ping, 0))
            .unwrap();
        assert_eq!(response.host, 4);
    }

    #[test]
    fn test_short_and_unknown_messages() {
        let mut script = routed();
        script.inbox.push_back(MeshFrame::new(0o3, MESH_MESSAGE, vec![1, 2]));
        script.inbox.push_back(MeshFrame::new(0o3, b'X', vec![1]));
        script.inbox.push_back(MeshFrame::new(0o3, MESH_MESSAGE_PING, vec![]));
        let (mut master, _) = master(script);

        assert_eq!(
            master.read_response(),
            Err(MeshError::BadSizeRead { size: 2 })
        );
        assert_eq!(
            master.read_response(),
            Err(MeshError::UnknownMessageType { kind: b'X' })
        );
        assert_eq!(
            master.read_response(),
            Err(MeshError::NoNetworkData { from: 0o3 })
        );
        assert_eq!(master.read_response(), Ok(None));
    }

    #[test]
    fn test_node_available_uses_routing_table() {
        let (mut master, _) = master(routed());
        assert!(master.node_available(0));
        assert!(master.node_available(3));
        assert!(!master.node_available(4));
        assert_eq!(RemoteNodes::nodes(&mut master), vec![3]);
        assert_eq!(master.network().address_of(3), Some(0o3));
        assert_ne!(master.network().address_of(3), Some(MASTER_ADDRESS));
    }
}
