//! Serial line over TCP.
//!
//! A host connects to the listener and talks the serial framing exactly as
//! it would over a UART. One client is served at a time; bytes go to the
//! node thread as they arrive and replies are written back as the node
//! produces them.

use std::io;
use std::net::SocketAddr;

use crossbeam_channel::Sender;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::node_thread::NodeCommand;

/// TCP listener standing in for the node's serial port.
#[derive(Debug)]
pub struct SerialBridge {
    listener: TcpListener,
}

impl SerialBridge {
    /// Bind to `addr`.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(SerialBridge { listener })
    }

    /// The bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until the node side goes away.
    pub async fn run(
        self,
        node_tx: Sender<NodeCommand>,
        mut reply_rx: mpsc::Receiver<Vec<u8>>,
    ) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!(%peer, "serial client connected");
            // Replies nobody collected belong to the previous client.
            while reply_rx.try_recv().is_ok() {}

            match handle_connection(stream, &node_tx, &mut reply_rx).await {
                Ok(Closed::Client) => info!(%peer, "serial client disconnected"),
                Ok(Closed::Node) => {
                    debug!("node loop stopped, closing bridge");
                    return Ok(());
                }
                Err(err) => warn!(%peer, error = %err, "serial connection failed"),
            }
        }
    }
}

enum Closed {
    Client,
    Node,
}

async fn handle_connection(
    mut stream: TcpStream,
    node_tx: &Sender<NodeCommand>,
    reply_rx: &mut mpsc::Receiver<Vec<u8>>,
) -> io::Result<Closed> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 256];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(Closed::Client);
                }
                if node_tx.send(NodeCommand::SerialRx(read_buf[..n].to_vec())).is_err() {
                    return Ok(Closed::Node);
                }
            }
            reply = reply_rx.recv() => {
                let Some(reply) = reply else {
                    return Ok(Closed::Node);
                };
                writer.write_all(&reply).await?;
                writer.flush().await?;
            }
        }
    }
}
