//! Server side: one socket, many configured peers, one event loop.
//!
//! A [`Server`] never dials out. It answers handshakes from its configured
//! peers, learns their network addresses from verified frames, and demotes
//! peers that go silent. Inbound packets are dispatched to per-peer state
//! by the source virtual address; anything from an unconfigured source is
//! dropped before any cryptography runs.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

use crate::core::{
    ConnError, LocalEndpoint, PacketError, RemotePeer, CONTROL_TICK, DELIVERY_QUEUE_DEPTH,
    RECV_BUFFER_SIZE,
};
use crate::peer::Peer;
use crate::transport::SudpSocket;
use crate::wire::decode_datagram;

type SendRequest = (u16, Vec<u8>, oneshot::Sender<Result<(), ConnError>>);

/// Handle to a running listener.
pub struct Server {
    send_tx: mpsc::Sender<SendRequest>,
    delivery_rx: mpsc::Receiver<(u16, Vec<u8>)>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the local socket and start serving the configured peers.
    ///
    /// Peers may omit their network address; it is learned from their
    /// first verified handshake.
    pub async fn listen(local: LocalEndpoint, peers: Vec<RemotePeer>) -> Result<Self, ConnError> {
        let socket = SudpSocket::bind(local.bind_address).await?;
        let local_addr = socket.local_addr()?;

        let peers: HashMap<u16, Peer> = peers
            .iter()
            .map(|descriptor| (descriptor.virtual_address, Peer::new(descriptor)))
            .collect();

        let (send_tx, send_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);

        let driver = Driver {
            socket,
            local,
            peers,
            send_rx,
            delivery_tx,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            send_tx,
            delivery_rx,
            local_addr,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Encrypt and send one payload to a peer by virtual address.
    ///
    /// Fails with [`ConnError::UnknownPeer`] for unconfigured addresses
    /// and [`ConnError::NotReady`] before the peer's first handshake or
    /// after it times out.
    pub async fn send_to(&self, payload: Vec<u8>, vaddr: u16) -> Result<(), ConnError> {
        let (respond, result) = oneshot::channel();
        self.send_tx
            .send((vaddr, payload, respond))
            .await
            .map_err(|_| ConnError::Closed)?;
        result.await.map_err(|_| ConnError::Closed)?
    }

    /// Receive the next decrypted payload along with the sending peer's
    /// virtual address. Returns `None` once the driver has stopped.
    pub async fn recv_from(&mut self) -> Option<(Vec<u8>, u16)> {
        self.delivery_rx
            .recv()
            .await
            .map(|(vaddr, payload)| (payload, vaddr))
    }
}

/// The listener's single-task event loop.
struct Driver {
    socket: SudpSocket,
    local: LocalEndpoint,
    peers: HashMap<u16, Peer>,
    send_rx: mpsc::Receiver<SendRequest>,
    delivery_tx: mpsc::Sender<(u16, Vec<u8>)>,
}

impl Driver {
    async fn run(mut self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let mut sweep = interval(CONTROL_TICK);

        loop {
            tokio::select! {
                request = self.send_rx.recv() => {
                    let Some((vaddr, payload, respond)) = request else {
                        tracing::debug!("server handle dropped, stopping driver");
                        break;
                    };
                    let result = match self.peers.get(&vaddr) {
                        Some(peer) => peer.send_data(&payload, &self.local, &self.socket).await,
                        None => Err(ConnError::UnknownPeer(vaddr)),
                    };
                    let _ = respond.send(result);
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.on_datagram(&buf[..len], from).await,
                        Err(e) => {
                            tracing::error!(error = %e, "socket receive failed, closing");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    for peer in self.peers.values_mut() {
                        peer.expire_if_silent();
                    }
                }
            }
        }
    }

    async fn on_datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        let (header, body) = match decode_datagram(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(%from, error = %e, "dropping malformed datagram");
                return;
            }
        };
        if header.dst != self.local.virtual_address {
            tracing::debug!(dst = header.dst, "dropping datagram for another destination");
            return;
        }
        let Some(peer) = self.peers.get_mut(&header.src) else {
            tracing::debug!(
                %from,
                error = %PacketError::InvalidSource(header.src),
                "dropping datagram"
            );
            return;
        };
        if let Err(e) = peer
            .handle_packet(&header, body, from, &self.local, &self.socket, &self.delivery_tx)
            .await
        {
            tracing::debug!(src = header.src, error = %e, frame = ?header.frame_type, "packet rejected");
        }
    }
}
