//! Error types for the SUDP protocol.
//!
//! The taxonomy is two-level: [`PacketError`] covers everything that makes
//! a single inbound packet unusable (logged and dropped, never surfaced to
//! the application), while [`ConnError`] covers connection-lifecycle
//! failures returned to whichever call is pending.

use thiserror::Error;

/// Packet-level failures. Dropping the packet is always the right recovery;
/// peer state is left exactly as it was.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Header too short, malformed, or carrying an unknown frame type.
    #[error("invalid header")]
    InvalidHeader,

    /// Source virtual address is not a configured peer.
    #[error("source vaddr {0} is not a configured peer")]
    InvalidSource(u16),

    /// Timestamp falls outside the learned anti-replay window.
    #[error("timestamp outside the anti-replay window")]
    OutOfTimeWindow,

    /// Recomputed checksum disagrees with the carried value.
    #[error("checksum mismatch: carried {carried:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame.
        carried: u32,
        /// Checksum recomputed over header and content.
        computed: u32,
    },

    /// Static-key signature verification failed.
    #[error("signature verification failed")]
    BadSignature,

    /// Epoch id does not match the receiver's pending epoch.
    #[error("epoch {0} does not match the pending epoch")]
    InvalidEpoch(u32),

    /// A pending epoch already exists; a second one is never created.
    #[error("a pending epoch already exists")]
    PendingEpochExists,

    /// Promotion requested but no matching pending epoch is held.
    #[error("no pending epoch to promote")]
    NoSuchPending,

    /// Data frame failed decryption or post-decrypt checksum.
    #[error("data frame failed integrity check")]
    DataIntegrityFailure,

    /// No epoch has been promoted yet; data cannot be sent or received.
    #[error("no current epoch established")]
    NoCurrentEpoch,

    /// Payload exceeds the per-frame MTU budget.
    #[error("payload of {0} bytes exceeds the frame budget")]
    PayloadTooLarge(usize),

    /// A second derivation was attempted on a key-exchange handle.
    #[error("shared secret already derived for this handle")]
    AlreadyDerived,
}

/// Connection-lifecycle failures, surfaced to the pending `connect`,
/// `send` or `recv` caller. These stop the event loop where noted.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Handshake retries exhausted during connection setup.
    #[error("handshake timed out after {0} retries")]
    HandshakeTimeout(u32),

    /// The transport closed or failed underneath the event loop.
    #[error("transport closed unexpectedly")]
    UnexpectedClose,

    /// Static key material absent or malformed; raised before any loop runs.
    #[error("key material missing or malformed")]
    KeyMaterialMissing,

    /// A send was attempted while the peer is not ready. The network is
    /// never touched in this case.
    #[error("peer is not ready")]
    NotReady,

    /// The remote peer descriptor carries no network address to dial.
    #[error("remote peer has no network address")]
    NoPeerAddress,

    /// The virtual address does not belong to any configured peer.
    #[error("virtual address {0} is not a configured peer")]
    UnknownPeer(u16),

    /// The user payload does not fit a single data frame.
    #[error("payload of {0} bytes exceeds the frame budget")]
    PayloadTooLarge(usize),

    /// The connection's event loop has already terminated.
    #[error("connection closed")]
    Closed,

    /// Transport I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
