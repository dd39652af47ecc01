//! Client side: one remote peer, one connection, one event loop.
//!
//! [`connect`] performs the initial handshake and hands back a
//! [`ClientConn`]; a spawned driver task owns the socket and the peer state
//! from then on. User calls talk to the driver over channels, so the state
//! machine itself is never shared or locked.

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};

use crate::core::{
    ConnError, LocalEndpoint, RemotePeer, CONTROL_TICK, DELIVERY_QUEUE_DEPTH,
    EPOCH_ROTATION_INTERVAL, MAX_HANDSHAKE_RETRIES, RECV_BUFFER_SIZE,
};
use crate::peer::Peer;
use crate::transport::SudpSocket;
use crate::wire::decode_datagram;

type SendRequest = (Vec<u8>, oneshot::Sender<Result<(), ConnError>>);

/// Establish a connection to a configured remote peer.
///
/// Binds the local socket, runs the first handshake (retried on the
/// control tick), and resolves once the peer is ready. Fails with
/// [`ConnError::HandshakeTimeout`] if the peer never answers and with
/// [`ConnError::NoPeerAddress`] if the descriptor carries no address.
pub async fn connect(local: LocalEndpoint, remote: RemotePeer) -> Result<ClientConn, ConnError> {
    if remote.address.is_none() {
        return Err(ConnError::NoPeerAddress);
    }
    let socket = SudpSocket::bind(local.bind_address).await?;
    let mut peer = Peer::new(&remote);

    let (send_tx, send_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
    let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
    let (ready_tx, ready_rx) = oneshot::channel();

    peer.initiate_handshake(&local, &socket).await?;

    let driver = Driver {
        socket,
        local,
        peer,
        send_rx,
        delivery_tx,
        ready_tx: Some(ready_tx),
        steady: false,
    };
    tokio::spawn(driver.run());

    ready_rx.await.map_err(|_| ConnError::Closed)??;
    Ok(ClientConn {
        send_tx,
        delivery_rx,
    })
}

/// Handle to an established connection.
///
/// Dropping it stops the driver task once in-flight calls settle.
#[derive(Debug)]
pub struct ClientConn {
    send_tx: mpsc::Sender<SendRequest>,
    delivery_rx: mpsc::Receiver<(u16, Vec<u8>)>,
}

impl ClientConn {
    /// Encrypt and send one datagram payload to the peer.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), ConnError> {
        let (respond, result) = oneshot::channel();
        self.send_tx
            .send((payload, respond))
            .await
            .map_err(|_| ConnError::Closed)?;
        result.await.map_err(|_| ConnError::Closed)?
    }

    /// Receive the next decrypted payload from the peer. Returns `None`
    /// once the driver has stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.delivery_rx.recv().await.map(|(_, payload)| payload)
    }
}

/// The connection's single-task event loop.
struct Driver {
    socket: SudpSocket,
    local: LocalEndpoint,
    peer: Peer,
    send_rx: mpsc::Receiver<SendRequest>,
    delivery_tx: mpsc::Sender<(u16, Vec<u8>)>,
    ready_tx: Option<oneshot::Sender<Result<(), ConnError>>>,
    steady: bool,
}

impl Driver {
    async fn run(mut self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let start = Instant::now();
        // Delaying the first control tick makes the initial send plus the
        // retries span the full retry budget before timing out.
        let mut control = interval_at(start + CONTROL_TICK, CONTROL_TICK);
        let mut rotation = interval_at(start + EPOCH_ROTATION_INTERVAL, EPOCH_ROTATION_INTERVAL);

        loop {
            tokio::select! {
                request = self.send_rx.recv() => {
                    let Some((payload, respond)) = request else {
                        tracing::debug!("connection handle dropped, stopping driver");
                        break;
                    };
                    let result = self.peer.send_data(&payload, &self.local, &self.socket).await;
                    let _ = respond.send(result);
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            let was_steady = self.steady;
                            self.on_datagram(&buf[..len], from).await;
                            if self.steady && !was_steady {
                                // First rotation counts from readiness.
                                rotation.reset();
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "socket receive failed, closing");
                            if let Some(tx) = self.ready_tx.take() {
                                let _ = tx.send(Err(ConnError::UnexpectedClose));
                            }
                            break;
                        }
                    }
                }
                _ = control.tick() => {
                    if self.on_control_tick().await {
                        break;
                    }
                }
                _ = rotation.tick(), if self.steady => {
                    if let Err(e) = self.peer.rotate(&self.local, &self.socket).await {
                        tracing::warn!(error = %e, "epoch rotation initiation failed");
                    }
                }
            }
        }
    }

    async fn on_datagram(&mut self, datagram: &[u8], from: std::net::SocketAddr) {
        let (header, body) = match decode_datagram(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed datagram");
                return;
            }
        };
        if header.dst != self.local.virtual_address
            || header.src != self.peer.virtual_address()
        {
            tracing::debug!(src = header.src, dst = header.dst, "dropping misaddressed datagram");
            return;
        }
        if let Err(e) = self
            .peer
            .handle_packet(&header, body, from, &self.local, &self.socket, &self.delivery_tx)
            .await
        {
            tracing::debug!(error = %e, frame = ?header.frame_type, "packet rejected");
            return;
        }
        if self.peer.is_ready() {
            if let Some(tx) = self.ready_tx.take() {
                let _ = tx.send(Ok(()));
            }
            self.steady = true;
        }
    }

    /// Returns true when the driver should stop.
    async fn on_control_tick(&mut self) -> bool {
        if self.peer.handshake_in_flight() {
            if let Some(epoch) = self.peer.retry_handshake(&self.socket).await {
                self.peer.abandon_handshake();
                if self.steady {
                    // Rotation failed; keep running on the current epoch
                    // and let the next rotation tick try again.
                    tracing::warn!(epoch, "epoch rotation abandoned after retries");
                } else {
                    tracing::error!(epoch, "handshake timed out, closing");
                    if let Some(tx) = self.ready_tx.take() {
                        let _ = tx.send(Err(ConnError::HandshakeTimeout(MAX_HANDSHAKE_RETRIES)));
                    }
                    return true;
                }
            }
        }
        // Keepalives run on every tick the peer is ready, including while
        // a rotation handshake is still being retried.
        if self.peer.is_ready() {
            if let Err(e) = self.peer.send_keepalive(&self.local, &self.socket).await {
                tracing::warn!(error = %e, "keepalive send failed");
            }
        }
        false
    }
}
