//! The node run loop on its own thread.
//!
//! The thread owns the mesh node and its serial adapter. Bytes from the
//! bridge arrive as [`NodeCommand::SerialRx`]; framed replies go back on a
//! tokio channel. Between commands the loop ticks the node, which on a
//! master also ticks every attached simulated slave.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use r2_mesh::{MeshNetwork, Node};
use r2_transport::SerialAdapter;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Commands sent to the node thread.
#[derive(Debug)]
pub enum NodeCommand {
    /// Bytes received from the serial client.
    SerialRx(Vec<u8>),
    /// Stop the loop.
    Shutdown,
}

/// Handle to a running node thread.
pub struct NodeThreadHandle {
    cmd_tx: Sender<NodeCommand>,
    thread: JoinHandle<()>,
}

impl NodeThreadHandle {
    /// Sender for commands, one per bridge connection.
    pub fn sender(&self) -> Sender<NodeCommand> {
        self.cmd_tx.clone()
    }

    /// Send a command.
    pub fn send(&self, cmd: NodeCommand) -> Result<(), crossbeam_channel::SendError<NodeCommand>> {
        self.cmd_tx.send(cmd)
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the loop to stop and wait for it.
    pub fn shutdown(self) -> thread::Result<()> {
        let _ = self.cmd_tx.send(NodeCommand::Shutdown);
        self.thread.join()
    }
}

/// Start the run loop for `node`.
pub fn spawn_node_thread<N>(
    node: Node<N>,
    tick_interval: Duration,
    reply_tx: mpsc::Sender<Vec<u8>>,
) -> std::io::Result<NodeThreadHandle>
where
    N: MeshNetwork + Send + 'static,
{
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let node_id = node.router().node_id();
    let thread = thread::Builder::new()
        .name(format!("node-{}", node_id))
        .spawn(move || node_thread_main(node, cmd_rx, tick_interval, reply_tx))?;
    Ok(NodeThreadHandle { cmd_tx, thread })
}

fn node_thread_main<N: MeshNetwork>(
    mut node: Node<N>,
    cmd_rx: Receiver<NodeCommand>,
    tick_interval: Duration,
    reply_tx: mpsc::Sender<Vec<u8>>,
) {
    let ctx = node.router().context();
    let mut serial = SerialAdapter::new(ctx.clock.clone(), ctx.config.serial_byte_timeout_ms);
    info!(node = ctx.node_id, role = ctx.role.as_str(), "node loop started");

    loop {
        let mut reply = match cmd_rx.recv_timeout(tick_interval) {
            Ok(NodeCommand::SerialRx(bytes)) => {
                trace!(rx = %hex::encode(&bytes), "serial bytes");
                serial.receive(&bytes, &mut node)
            }
            Ok(NodeCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => Vec::new(),
        };
        node.tick();
        if let Some(timeout) = serial.poll(&mut node) {
            reply.extend(timeout);
        }
        if reply.is_empty() {
            continue;
        }
        trace!(tx = %hex::encode(&reply), "serial reply");
        if reply_tx.blocking_send(reply).is_err() {
            debug!("serial bridge gone");
            break;
        }
    }
    info!(node = node.router().node_id(), "node loop stopped");
}
