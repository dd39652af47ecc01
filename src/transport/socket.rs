//! Async UDP socket wrapper for SUDP transport.
//!
//! Thin layer over [`tokio::net::UdpSocket`] with shared-reference send
//! and receive so the event loops can select over the socket alongside
//! their channels and timers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

/// Async UDP socket for SUDP datagrams.
#[derive(Debug, Clone)]
pub struct SudpSocket {
    socket: Arc<UdpSocket>,
}

impl SudpSocket {
    /// Bind a new socket to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
        }
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one datagram to a specific address.
    pub async fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(datagram, addr).await
    }

    /// Receive one datagram into the caller's buffer, returning its length
    /// and sender address. The buffer stays external so callers can hold
    /// the socket by shared reference inside `select!`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
