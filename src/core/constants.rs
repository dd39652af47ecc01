//! Protocol constants.
//!
//! Wire sizes are fixed by the frame formats and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE SIZES
// =============================================================================

/// Encoded header size: type + epoch + src + dst + length + timestamp + checksum.
pub const HEADER_SIZE: usize = 1 + 4 + 2 + 2 + 2 + 8 + 4;

/// X25519 / Ed25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 private key (seed) size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Ed25519 signature size.
pub const SIGNATURE_SIZE: usize = 64;

/// CRC32 checksum size.
pub const CHECKSUM_SIZE: usize = 4;

/// Handshake frame body size: checksum + ephemeral public key + signature.
pub const HANDSHAKE_SIZE: usize = CHECKSUM_SIZE + PUBLIC_KEY_SIZE + SIGNATURE_SIZE;

/// Control frame body size: checksum + flags + signature.
pub const CTRL_MESSAGE_SIZE: usize = CHECKSUM_SIZE + 1 + SIGNATURE_SIZE;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Bytes a data frame adds on top of the user payload.
pub const DATA_OVERHEAD: usize = CHECKSUM_SIZE + AEAD_NONCE_SIZE + AEAD_TAG_SIZE;

/// Datagram budget for mobile-safe path MTUs.
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Maximum frame body length carried by a header.
pub const MAX_BODY_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// Maximum user payload per data frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_BODY_SIZE - DATA_OVERHEAD;

// =============================================================================
// TIMING
// =============================================================================

/// Short tick driving keepalives and handshake retries.
pub const CONTROL_TICK: Duration = Duration::from_millis(500);

/// Long tick driving epoch rotation, armed once the connection is ready.
pub const EPOCH_ROTATION_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive handshake retries before the attempt is given up.
pub const MAX_HANDSHAKE_RETRIES: u32 = 4;

/// Accepted deviation from the learned clock offset of a peer.
pub const TIME_WINDOW: Duration = Duration::from_secs(10);

/// A peer silent for this long is no longer considered ready.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// CHANNELS / BUFFERS
// =============================================================================

/// Receive buffer size for the UDP socket.
pub const RECV_BUFFER_SIZE: usize = 65535;

/// Depth of the user-facing delivery queue.
pub const DELIVERY_QUEUE_DEPTH: usize = 64;
