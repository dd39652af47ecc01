//! Per-peer protocol state machine.
//!
//! A [`Peer`] owns everything the protocol tracks about one counterpart:
//! its epoch table, the learned anti-replay window, the last-known network
//! address, liveness, and at most one handshake in flight. The event loops
//! feed it inbound datagrams through [`Peer::handle_packet`] and drive
//! retries and keepalives from their control tick; every state change
//! happens only after a frame authenticates.

mod timesync;

pub use timesync::TimeSync;

use std::net::SocketAddr;

use ed25519_dalek::VerifyingKey;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::{
    ConnError, LocalEndpoint, PacketError, RemotePeer, MAX_HANDSHAKE_RETRIES, PEER_TIMEOUT,
};
use crate::crypto::EpochTable;
use crate::transport::SudpSocket;
use crate::wire::{
    decode_control, decode_data, decode_handshake, encode_control, encode_data, encode_handshake,
    ControlFlags, FrameType, Header,
};

/// Connection state of one peer.
///
/// `Ready` is only reachable through epoch promotion, so a ready peer
/// always holds a current session key. Rekeying is not a state of its own:
/// it overlaps `Ready` as an in-flight handshake record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No promoted epoch; nothing authenticated recently.
    Unverified,
    /// First key exchange in progress.
    HandshakePending,
    /// A current epoch exists and the peer is live.
    Ready,
}

/// An unacknowledged handshake datagram, kept for retransmission.
///
/// Initiators retry [`FrameType::ClientHandshake`] records on the control
/// tick; responders keep their [`FrameType::ServerHandshake`] reply and
/// repeat it only when the same initiation arrives again.
struct HandshakeInFlight {
    epoch: u32,
    frame_type: FrameType,
    datagram: Vec<u8>,
    dest: SocketAddr,
    sent_at: Instant,
    tries: u32,
}

/// Protocol state for one remote peer.
pub struct Peer {
    vaddr: u16,
    addr: Option<SocketAddr>,
    public_key: VerifyingKey,
    epochs: EpochTable,
    tsync: Option<TimeSync>,
    state: PeerState,
    last_message: Instant,
    handshake: Option<HandshakeInFlight>,
}

impl Peer {
    /// Build fresh state for a configured remote peer.
    pub fn new(descriptor: &RemotePeer) -> Self {
        Self {
            vaddr: descriptor.virtual_address,
            addr: descriptor.address,
            public_key: descriptor.public_key,
            epochs: EpochTable::new(),
            tsync: None,
            state: PeerState::Unverified,
            last_message: Instant::now(),
            handshake: None,
        }
    }

    /// The peer's virtual address.
    pub fn virtual_address(&self) -> u16 {
        self.vaddr
    }

    /// Current connection state.
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Whether data can be sent to this peer right now.
    pub fn is_ready(&self) -> bool {
        self.state == PeerState::Ready
    }

    /// Last-known network address.
    pub fn address(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Record a frame that passed authentication: learn or hold the
    /// anti-replay offset, refresh liveness, and follow address migration.
    fn observe_verified(&mut self, timestamp: u64, from: SocketAddr) {
        if self.tsync.is_none() {
            self.tsync = Some(TimeSync::new(timestamp));
        }
        self.last_message = Instant::now();
        match self.addr {
            Some(prev) if prev != from => {
                tracing::info!(vaddr = self.vaddr, %from, "peer address migrated");
                self.addr = Some(from);
            }
            None => self.addr = Some(from),
            _ => {}
        }
        if self.epochs.current().is_some() {
            self.state = PeerState::Ready;
        }
    }

    /// Process one inbound frame addressed to us from this peer.
    ///
    /// Any error means the packet is dropped; peer state is only touched
    /// after the frame authenticates.
    pub async fn handle_packet(
        &mut self,
        header: &Header,
        body: &[u8],
        from: SocketAddr,
        local: &LocalEndpoint,
        socket: &SudpSocket,
        delivery: &mpsc::Sender<(u16, Vec<u8>)>,
    ) -> Result<(), PacketError> {
        if let Some(tsync) = &self.tsync {
            if !tsync.in_time(header.timestamp) {
                return Err(PacketError::OutOfTimeWindow);
            }
        }

        match header.frame_type {
            FrameType::ClientHandshake => {
                self.on_client_handshake(header, body, from, local, socket).await
            }
            FrameType::ServerHandshake => {
                self.on_server_handshake(header, body, from, local, socket).await
            }
            FrameType::CtrlMessage => self.on_control(header, body, from, local, socket).await,
            FrameType::Data => self.on_data(header, body, from, delivery),
        }
    }

    /// Responder side: a peer initiates (or retries) a key exchange.
    ///
    /// An initiation for a *different* epoch than the one pending is
    /// rejected, never overwritten; a repeat of the one we already
    /// answered gets the stored reply again, with no second derivation.
    async fn on_client_handshake(
        &mut self,
        header: &Header,
        body: &[u8],
        from: SocketAddr,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), PacketError> {
        let ephemeral = decode_handshake(header, body, &self.public_key)?;

        if let Some(hs) = &self.handshake {
            if hs.frame_type == FrameType::ServerHandshake && hs.epoch == header.epoch {
                if let Err(e) = socket.send_to(&hs.datagram, from).await {
                    tracing::warn!(vaddr = self.vaddr, error = %e, "handshake reply resend failed");
                }
                self.observe_verified(header.timestamp, from);
                return Ok(());
            }
        }

        let dhss = self.epochs.create(header.epoch)?;
        dhss.derive(&ephemeral)?;
        let our_ephemeral = *dhss.public();

        let reply = encode_handshake(
            FrameType::ServerHandshake,
            header.epoch,
            local.virtual_address,
            self.vaddr,
            &our_ephemeral,
            &local.signing_key,
        );
        if let Err(e) = socket.send_to(&reply, from).await {
            tracing::warn!(vaddr = self.vaddr, error = %e, "handshake reply send failed");
        }
        self.handshake = Some(HandshakeInFlight {
            epoch: header.epoch,
            frame_type: FrameType::ServerHandshake,
            datagram: reply,
            dest: from,
            sent_at: Instant::now(),
            tries: 0,
        });
        if self.state == PeerState::Unverified {
            self.state = PeerState::HandshakePending;
        }
        self.observe_verified(header.timestamp, from);
        Ok(())
    }

    /// Initiator side: the peer answered our exchange. The epoch must
    /// match our pending one; replies retransmitted after promotion fall
    /// out of that check and are dropped.
    async fn on_server_handshake(
        &mut self,
        header: &Header,
        body: &[u8],
        from: SocketAddr,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), PacketError> {
        let ephemeral = decode_handshake(header, body, &self.public_key)?;

        let (pending_epoch, dhss) = self
            .epochs
            .pending_mut()
            .ok_or(PacketError::NoSuchPending)?;
        if header.epoch != pending_epoch {
            return Err(PacketError::InvalidEpoch(header.epoch));
        }
        dhss.derive(&ephemeral)?;
        self.epochs.promote(header.epoch)?;
        self.handshake = None;
        self.state = PeerState::Ready;
        self.observe_verified(header.timestamp, from);

        let ack = encode_control(
            header.epoch,
            local.virtual_address,
            self.vaddr,
            ControlFlags::EPOCH_ACK,
            &local.signing_key,
        );
        if let Err(e) = socket.send_to(&ack, from).await {
            tracing::warn!(vaddr = self.vaddr, error = %e, "epoch ack send failed");
        }
        Ok(())
    }

    /// Signed control frames: keepalives and epoch acknowledgments.
    ///
    /// An `EpochAck` only promotes when it matches the pending epoch; a
    /// stale or duplicated ack is ignored, and the frame still counts for
    /// liveness and still earns its keepalive reply.
    async fn on_control(
        &mut self,
        header: &Header,
        body: &[u8],
        from: SocketAddr,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), PacketError> {
        let flags = decode_control(header, body, &self.public_key)?;

        if flags.is_epoch_ack() {
            let pending = self.epochs.pending().map(|(id, _)| id);
            if pending == Some(header.epoch) {
                self.epochs.promote(header.epoch)?;
                self.state = PeerState::Ready;
            } else {
                tracing::debug!(
                    vaddr = self.vaddr,
                    epoch = header.epoch,
                    "epoch ack without matching pending, ignored"
                );
            }
        }

        self.observe_verified(header.timestamp, from);

        if flags.is_keep_alive() {
            let reply = encode_control(
                header.epoch,
                local.virtual_address,
                self.vaddr,
                ControlFlags::KEEP_ALIVE_ACK,
                &local.signing_key,
            );
            if let Err(e) = socket.send_to(&reply, from).await {
                tracing::warn!(vaddr = self.vaddr, error = %e, "keepalive ack send failed");
            }
        }
        Ok(())
    }

    /// Encrypted user payload. A frame under the pending epoch acts as an
    /// implicit acknowledgment: the sender can only have encrypted it
    /// after completing the exchange, so the epoch is promoted on the spot
    /// once the frame decrypts.
    ///
    /// Delivery is best effort: when the delivery queue is full the
    /// payload is dropped (and logged) so the event loop never stalls on
    /// a slow consumer. The frame still counts as verified.
    fn on_data(
        &mut self,
        header: &Header,
        body: &[u8],
        from: SocketAddr,
        delivery: &mpsc::Sender<(u16, Vec<u8>)>,
    ) -> Result<(), PacketError> {
        let promote = match self.epochs.current() {
            Some((id, _)) if id == header.epoch => false,
            _ => match self.epochs.pending() {
                Some((id, dhss)) if id == header.epoch && dhss.is_derived() => true,
                _ => return Err(PacketError::InvalidEpoch(header.epoch)),
            },
        };

        let key = if promote {
            self.epochs.pending().map(|(_, dhss)| dhss)
        } else {
            self.epochs.current().map(|(_, dhss)| dhss)
        }
        .and_then(|dhss| dhss.session_key())
        .ok_or(PacketError::NoCurrentEpoch)?;

        let payload = decode_data(header, body, key)?;

        if promote {
            self.epochs.promote(header.epoch)?;
            self.state = PeerState::Ready;
        }
        self.observe_verified(header.timestamp, from);

        if let Err(e) = delivery.try_send((self.vaddr, payload)) {
            tracing::warn!(vaddr = self.vaddr, error = %e, "delivery queue full, payload dropped");
        }
        Ok(())
    }

    /// Start a new key exchange with this peer. Any exchange still pending
    /// is abandoned first; the initiation is retried on the control tick
    /// until answered or [`MAX_HANDSHAKE_RETRIES`] is reached.
    pub async fn initiate_handshake(
        &mut self,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), ConnError> {
        let dest = self.addr.ok_or(ConnError::NoPeerAddress)?;

        self.epochs.clear_pending();
        let epoch = self.epochs.next_epoch();
        // Cannot fail: the slot was just cleared and the id never collides
        // with the current one.
        let dhss = self
            .epochs
            .create(epoch)
            .map_err(|_| ConnError::UnexpectedClose)?;
        let ephemeral = *dhss.public();

        let datagram = encode_handshake(
            FrameType::ClientHandshake,
            epoch,
            local.virtual_address,
            self.vaddr,
            &ephemeral,
            &local.signing_key,
        );
        socket.send_to(&datagram, dest).await?;

        self.handshake = Some(HandshakeInFlight {
            epoch,
            frame_type: FrameType::ClientHandshake,
            datagram,
            dest,
            sent_at: Instant::now(),
            tries: 0,
        });
        if self.state == PeerState::Unverified {
            self.state = PeerState::HandshakePending;
        }
        Ok(())
    }

    /// Rotation tick entry: start the next key exchange, or do nothing at
    /// all while one is already pending.
    pub async fn rotate(
        &mut self,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), ConnError> {
        if self.handshake.is_some() || self.epochs.pending().is_some() {
            return Ok(());
        }
        self.initiate_handshake(local, socket).await
    }

    /// Drive the handshake retry clock one tick. Returns the epoch id of
    /// an exchange whose retries are exhausted; the caller decides whether
    /// that fails the connection or merely abandons the rotation.
    pub async fn retry_handshake(&mut self, socket: &SudpSocket) -> Option<u32> {
        let hs = self.handshake.as_mut()?;
        if hs.frame_type != FrameType::ClientHandshake {
            return None;
        }
        hs.tries += 1;
        if hs.tries >= MAX_HANDSHAKE_RETRIES {
            tracing::debug!(
                vaddr = self.vaddr,
                epoch = hs.epoch,
                elapsed = ?hs.sent_at.elapsed(),
                "handshake retries exhausted"
            );
            return Some(hs.epoch);
        }
        if let Err(e) = socket.send_to(&hs.datagram, hs.dest).await {
            tracing::warn!(vaddr = self.vaddr, error = %e, "handshake retry send failed");
        }
        None
    }

    /// Whether a handshake initiation is awaiting an answer.
    pub fn handshake_in_flight(&self) -> bool {
        matches!(
            &self.handshake,
            Some(hs) if hs.frame_type == FrameType::ClientHandshake
        )
    }

    /// Drop the in-flight exchange and its pending epoch.
    pub fn abandon_handshake(&mut self) {
        self.handshake = None;
        self.epochs.clear_pending();
        if self.state == PeerState::HandshakePending {
            self.state = PeerState::Unverified;
        }
    }

    /// Encrypt and send one user payload under the current epoch.
    ///
    /// Fails with [`ConnError::NotReady`] before touching the network if
    /// no promoted epoch exists or the peer has gone silent.
    pub async fn send_data(
        &self,
        payload: &[u8],
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), ConnError> {
        if !self.is_ready() {
            return Err(ConnError::NotReady);
        }
        let dest = self.addr.ok_or(ConnError::NoPeerAddress)?;
        let (epoch, key) = self
            .epochs
            .current()
            .and_then(|(id, dhss)| dhss.session_key().map(|key| (id, key)))
            .ok_or(ConnError::NotReady)?;

        let datagram = encode_data(epoch, local.virtual_address, self.vaddr, payload, key)
            .map_err(|e| match e {
                PacketError::PayloadTooLarge(n) => ConnError::PayloadTooLarge(n),
                _ => ConnError::NotReady,
            })?;
        socket.send_to(&datagram, dest).await?;
        Ok(())
    }

    /// Send a signed liveness probe. No-op while the peer is not ready.
    pub async fn send_keepalive(
        &self,
        local: &LocalEndpoint,
        socket: &SudpSocket,
    ) -> Result<(), ConnError> {
        if !self.is_ready() {
            return Ok(());
        }
        let dest = self.addr.ok_or(ConnError::NoPeerAddress)?;
        let epoch = self.epochs.current().map(|(id, _)| id).unwrap_or(0);
        let probe = encode_control(
            epoch,
            local.virtual_address,
            self.vaddr,
            ControlFlags::KEEP_ALIVE,
            &local.signing_key,
        );
        socket.send_to(&probe, dest).await?;
        Ok(())
    }

    /// Liveness sweep: a peer silent past [`PEER_TIMEOUT`] is demoted and
    /// stays demoted until its next verified frame. Returns whether this
    /// call demoted it.
    pub fn expire_if_silent(&mut self) -> bool {
        if self.is_ready() && self.last_message.elapsed() > PEER_TIMEOUT {
            tracing::info!(vaddr = self.vaddr, "peer timed out, demoting");
            self.state = PeerState::Unverified;
            true
        } else {
            false
        }
    }
}
