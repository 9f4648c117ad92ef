//! `r2router`: a simulated device router node reachable over TCP.
//!
//! The node runs on a simulated board with file-backed or in-memory
//! non-volatile storage. Its serial transport is exposed on a TCP socket, so
//! a host talks to it exactly as it would over a UART. A master can carry
//! simulated slaves on an in-process mesh.

pub mod bridge;
pub mod config;
pub mod error;
pub mod node_thread;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use r2_mesh::{Node, SimMeshEndpoint, SimMeshHub};
use r2_packet::NODE_ID_STORAGE_ADDRESS;
use r2_router::{
    FileStorage, MemoryStorage, NonVolatileStorage, Role, Router, RouterConfig, RouterContext,
    SharedClock, SimBoard, StdClock,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use bridge::SerialBridge;
pub use config::RunnerConfig;
pub use error::RunnerError;
pub use node_thread::{spawn_node_thread, NodeCommand, NodeThreadHandle};

fn simulated_router(
    config: &RouterConfig,
    mut storage: Box<dyn NonVolatileStorage>,
    node_id: Option<u8>,
    clock: &SharedClock,
) -> Result<Router, RunnerError> {
    if let Some(node_id) = node_id {
        storage.update(NODE_ID_STORAGE_ADDRESS, node_id)?;
    }
    let ctx = RouterContext::new(
        config.clone(),
        Box::new(SimBoard::new()),
        storage,
        clock.clone(),
    )?;
    Ok(Router::new(ctx))
}

/// Build the configured node and, on a master, its simulated slaves.
pub fn build_node(
    config: &RunnerConfig,
    clock: SharedClock,
) -> Result<Node<SimMeshEndpoint>, RunnerError> {
    let storage: Box<dyn NonVolatileStorage> = match &config.storage {
        Some(path) => Box::new(FileStorage::open(path)?),
        None => Box::new(MemoryStorage::new()),
    };
    let router = simulated_router(&config.router, storage, config.node_id, &clock)?;

    let hub = SimMeshHub::new();
    let mut endpoint = hub.join(router.node_id());
    if router.context().role == Role::Master {
        for &slave_id in &config.slaves {
            let slave = simulated_router(
                &config.router,
                Box::new(MemoryStorage::new()),
                Some(slave_id),
                &clock,
            )?;
            endpoint.attach(Node::new(slave, hub.join(slave_id)));
            info!(node = slave_id, "simulated slave joined");
        }
    } else if !config.slaves.is_empty() {
        warn!(
            node = router.node_id(),
            "slaves are only simulated behind a master, ignoring them"
        );
    }
    Ok(Node::new(router, endpoint))
}

/// A running node and its serial bridge.
pub struct Runner {
    bridge: SerialBridge,
    node: NodeThreadHandle,
    reply_rx: mpsc::Receiver<Vec<u8>>,
}

impl Runner {
    /// Build the node, start its loop and bind the bridge.
    pub async fn start(config: RunnerConfig) -> Result<Self, RunnerError> {
        config.validate()?;
        let node = build_node(&config, StdClock::shared())?;
        let bridge = SerialBridge::bind(&config.listen).await?;
        let (reply_tx, reply_rx) = mpsc::channel(64);
        let node = spawn_node_thread(
            node,
            Duration::from_millis(config.tick_interval_ms),
            reply_tx,
        )?;
        info!(listen = %bridge.local_addr()?, "serial bridge listening");
        Ok(Runner {
            bridge,
            node,
            reply_rx,
        })
    }

    /// Address the bridge is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bridge.local_addr()
    }

    /// Serve until `shutdown` completes or the node loop stops.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RunnerError>
    where
        F: Future<Output = ()>,
    {
        let Runner {
            bridge,
            node,
            reply_rx,
        } = self;
        let node_tx = node.sender();

        let result = tokio::select! {
            result = bridge.run(node_tx, reply_rx) => result.map_err(RunnerError::from),
            _ = shutdown => {
                info!("shutdown requested");
                Ok(())
            }
        };

        tokio::task::spawn_blocking(move || node.shutdown())
            .await
            .map_err(|_| RunnerError::NodeThread)?
            .map_err(|_| RunnerError::NodeThread)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2_mesh::MeshSession;
    use r2_router::ManualClock;

    #[test]
    fn test_master_carries_slaves() {
        let config = RunnerConfig {
            slaves: vec![1, 2],
            ..RunnerConfig::default()
        };
        let node = build_node(&config, ManualClock::new().shared()).unwrap();
        assert_eq!(node.router().node_id(), 0);
        let MeshSession::Master(master) = node.session() else {
            panic!("node 0 is the master");
        };
        assert_eq!(r2_mesh::MeshNetwork::nodes(master.network()), vec![1, 2]);
    }

    #[test]
    fn test_node_id_override_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            node_id: Some(6),
            storage: Some(dir.path().join("node.eeprom")),
            slaves: vec![1],
            ..RunnerConfig::default()
        };
        let node = build_node(&config, ManualClock::new().shared()).unwrap();
        assert_eq!(node.router().context().role, Role::Slave);
        drop(node);

        let reopened = RunnerConfig {
            node_id: None,
            ..config
        };
        let node = build_node(&reopened, ManualClock::new().shared()).unwrap();
        assert_eq!(node.router().node_id(), 6);
    }
}
