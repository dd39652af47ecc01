//! # SUDP Protocol
//!
//! **S**ecure **U**DP **D**atagram **P**rotocol
//!
//! SUDP is a point-to-point secure datagram transport over UDP. Endpoints
//! are named by 16-bit virtual addresses independent of their network
//! location, and every connection provides:
//!
//! - **Authentication**: every handshake and control frame is signed with
//!   the sender's long-term Ed25519 key
//! - **Confidentiality**: payloads are sealed with XChaCha20-Poly1305 under
//!   per-epoch session keys from an ephemeral X25519 exchange
//! - **Rekeying**: epochs rotate periodically; the two-message handshake
//!   never interrupts traffic on the current key
//! - **Mobility**: verified frames carry the peer across network address
//!   changes
//! - **Replay defense**: a per-peer time window learned from the first
//!   authenticated frame rejects stale datagrams
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and endpoint descriptors
//! - [`wire`]: header and frame body codecs
//! - [`crypto`]: signing, key exchange and the per-peer epoch table
//! - [`peer`]: the per-peer protocol state machine
//! - [`transport`]: the async UDP socket
//! - [`client`] / [`server`]: connection roles and their event loops
//!
//! ## Example
//!
//! ```rust,no_run
//! use sudp_protocol::{connect, LocalEndpoint, RemotePeer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Long-term keys are provisioned out of band.
//! let our_key = sudp_protocol::crypto::generate_signing_key();
//! let their_key = sudp_protocol::crypto::generate_signing_key().verifying_key();
//!
//! let mut conn = connect(
//!     LocalEndpoint::new(7, "0.0.0.0:0".parse()?, our_key),
//!     RemotePeer::new(1001, Some("203.0.113.9:7400".parse()?), their_key),
//! )
//! .await?;
//!
//! conn.send(b"hello".to_vec()).await?;
//! if let Some(reply) = conn.recv().await {
//!     println!("peer says: {reply:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod core;
pub mod crypto;
pub mod peer;
pub mod server;
pub mod transport;

pub mod wire;

// Re-export the connection API and the types it takes at the crate root.
pub use client::{connect, ClientConn};
pub use core::{ConnError, LocalEndpoint, PacketError, RemotePeer};
pub use server::Server;
