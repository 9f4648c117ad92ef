//! Slave side of the mesh session.
//!
//! One [`MeshSlave::tick`] is one iteration of a slave's run loop:
//! pump the network, check connectivity (renewing the address when the
//! master lost it), answer every pending message, then sleep if asked to.

use r2_metrics::metrics::counter;
use r2_metrics::{metric_defs, MessageKind, NodeLabels};
use r2_packet::{
    decode_request, encode_response, Fault, DEVICE_HOST_LOCAL, MESH_MESSAGE, MESH_MESSAGE_NONE,
    MESH_MESSAGE_PING, MIN_REQUEST_SIZE,
};
use r2_router::{MeshConfig, Router, SharedClock};
use tracing::{debug, info, trace, warn};

use crate::error::MeshError;
use crate::network::{MeshFrame, MeshNetwork, MASTER_ADDRESS};

/// Mesh session of a slave node.
pub struct MeshSlave<N> {
    network: N,
    clock: SharedClock,
    config: MeshConfig,
    labels: NodeLabels,
    last_ping: u64,
    last_renewal: u64,
    sleep_started: bool,
}

impl<N> std::fmt::Debug for MeshSlave<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSlave")
            .field("config", &self.config)
            .field("sleep_started", &self.sleep_started)
            .finish()
    }
}

impl<N: MeshNetwork> MeshSlave<N> {
    /// Session over `network`.
    pub fn new(network: N, clock: SharedClock, config: MeshConfig, labels: NodeLabels) -> Self {
        let now = clock.millis();
        MeshSlave {
            network,
            clock,
            config,
            labels,
            last_ping: now,
            last_renewal: now,
            sleep_started: false,
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

    /// Whether the node went to sleep on an earlier tick and has not been
    /// woken by traffic since.
    pub fn is_sleeping(&self) -> bool {
        self.sleep_started
    }

    /// One run-loop iteration. Returns the number of messages handled.
    ///
    /// Failures are recorded in the router's diagnostics; none of them stop
    /// the loop.
    pub fn tick(&mut self, router: &mut Router) -> usize {
        self.network.update();
        self.network_check(router.node_id());

        let mut handled = 0;
        while let Some(frame) = self.network.read() {
            if frame.kind == MESH_MESSAGE_NONE {
                continue;
            }
            self.wake(router);
            let outcome = match frame.kind {
                MESH_MESSAGE => self.handle_message(router, &frame),
                MESH_MESSAGE_PING => self.read_ping(&frame),
                kind => Err(MeshError::UnknownMessageType { kind }),
            };
            if let Err(err) = outcome {
                warn!(node = router.node_id(), error = %err, "mesh message failed");
                router.context_mut().fail(Fault::from(&err));
            }
            handled += 1;
        }

        if let Err(err) = self.handle_sleep(router) {
            warn!(node = router.node_id(), error = %err, "sleep failed");
            router.context_mut().fail(Fault::from(&err));
        }
        handled
    }

    /// Keep-alive ping and periodic connection check.
    fn network_check(&mut self, node_id: u8) {
        let now = self.clock.millis();
        if let Some(interval) = self.config.ping_interval_ms {
            if now.saturating_sub(self.last_ping) >= interval {
                self.last_ping = now;
                counter!(
                    metric_defs::MESH_TX_MESSAGES.name,
                    &self.labels.for_message(MessageKind::Ping)
                )
                .increment(1);
                if !self.network.write(MASTER_ADDRESS, MESH_MESSAGE_PING, &[node_id]) {
                    debug!(node_id, "ping failed, renewing address");
                    self.renew();
                }
            }
        }

        if now.saturating_sub(self.last_renewal) >= self.config.renewal_interval_ms {
            self.last_renewal = now;
            if !self.network.check_connection() {
                debug!(node_id, "no connection, renewing address");
                self.renew();
            }
        }
    }

    fn renew(&mut self) {
        counter!(metric_defs::MESH_RENEWALS.name, &self.labels.base()).increment(1);
        if !self.network.renew_address(self.config.renewal_timeout_ms) {
            warn!(
                timeout_ms = self.config.renewal_timeout_ms,
                "address renewal failed"
            );
        }
    }

    /// Traffic arrived: leave sleep and hold it off for a while.
    fn wake(&mut self, router: &mut Router) {
        if !self.sleep_started {
            return;
        }
        self.sleep_started = false;
        let ctx = router.context_mut();
        let now = ctx.now();
        let pause = ctx.config.sleep.wake_pause_secs;
        let max = ctx.config.sleep.max_pause_secs;
        ctx.schedule.pause(now, pause, max);
        info!(node = ctx.node_id, pause_secs = pause, "woken by traffic");
    }

    /// Execute a request and write the response to the master, retrying the
    /// write once.
    fn handle_message(&mut self, router: &mut Router, frame: &MeshFrame) -> Result<(), MeshError> {
        if frame.payload.len() < MIN_REQUEST_SIZE {
            return Err(MeshError::BadSizeRead {
                size: frame.payload.len(),
            });
        }
        counter!(
            metric_defs::MESH_RX_MESSAGES.name,
            &self.labels.for_message(MessageKind::Message)
        )
        .increment(1);

        let response = match decode_request(&frame.payload) {
            Ok(request) => router.execute(&request),
            Err(err) => {
                debug!(error = %err, "mesh request rejected");
                router.reject(Fault::from(&err))
            }
        };
        let packet = encode_response(&response)?;
        trace!(action = %response.action, size = packet.len(), "writing response");

        if !self.network.write(MASTER_ADDRESS, MESH_MESSAGE, &packet) {
            counter!(metric_defs::MESH_WRITE_RETRIES.name, &self.labels.base()).increment(1);
            self.clock.delay_ms(self.config.write_retry_delay_ms);
            if !self.network.write(MASTER_ADDRESS, MESH_MESSAGE, &packet) {
                return Err(MeshError::WriteFailed {
                    node: DEVICE_HOST_LOCAL,
                });
            }
        }
        counter!(
            metric_defs::MESH_TX_MESSAGES.name,
            &self.labels.for_message(MessageKind::Message)
        )
        .increment(1);
        Ok(())
    }

    /// The master's echo of a keep-alive ping.
    fn read_ping(&mut self, frame: &MeshFrame) -> Result<(), MeshError> {
        let Some(&node) = frame.payload.first() else {
            return Err(MeshError::NoNetworkData { from: frame.from });
        };
        trace!(node, "ping echoed");
        Ok(())
    }

    fn handle_sleep(&mut self, router: &mut Router) -> Result<(), MeshError> {
        let ctx = router.context_mut();
        let now = ctx.now();
        if ctx.schedule.is_paused(now) {
            return Ok(());
        }
        if !ctx.sleep.enabled {
            self.sleep_started = false;
            return Ok(());
        }
        if !self.sleep_started {
            info!(node = ctx.node_id, cycles = ctx.sleep.cycles, "sending node to sleep");
            self.sleep_started = true;
            // Let pending work finish before the radio powers down.
            self.clock.delay_ms(ctx.config.sleep.settle_delay_ms);
        }
        if !self.network.sleep_node(ctx.sleep.cycles) {
            return Err(MeshError::FailedToSleep);
        }
        counter!(metric_defs::SLEEP_CYCLES.name, &self.labels.base()).increment(1);
        Ok(())
    }
}
