//! Endpoint descriptors consumed by the protocol core.
//!
//! Key loading and config-file parsing live outside this crate; the core
//! takes already-validated values. The byte-level constructors exist for
//! hosts that hand over raw key material and surface
//! [`ConnError::KeyMaterialMissing`] before any event loop starts.

use std::net::SocketAddr;

use ed25519_dalek::{SigningKey, VerifyingKey};

use super::{ConnError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

/// The local endpoint: virtual address, bind address and long-term
/// signing key.
#[derive(Clone)]
pub struct LocalEndpoint {
    /// Protocol-level identity, independent of the network address.
    pub virtual_address: u16,
    /// Address the UDP socket binds to.
    pub bind_address: SocketAddr,
    /// Long-term static private key used to sign handshakes and control
    /// frames.
    pub signing_key: SigningKey,
}

impl LocalEndpoint {
    /// Create a local endpoint from an already-loaded signing key.
    pub fn new(virtual_address: u16, bind_address: SocketAddr, signing_key: SigningKey) -> Self {
        Self {
            virtual_address,
            bind_address,
            signing_key,
        }
    }

    /// Create a local endpoint from raw private-key bytes.
    pub fn from_key_bytes(
        virtual_address: u16,
        bind_address: SocketAddr,
        key: &[u8],
    ) -> Result<Self, ConnError> {
        let seed: [u8; PRIVATE_KEY_SIZE] =
            key.try_into().map_err(|_| ConnError::KeyMaterialMissing)?;
        Ok(Self::new(
            virtual_address,
            bind_address,
            SigningKey::from_bytes(&seed),
        ))
    }
}

/// A configured remote peer: virtual address, static public key, and the
/// last-known network address.
///
/// The network address is required when connecting out as a client; a
/// listener may leave it unset and learn it from the peer's first verified
/// handshake (address migration keeps it current afterwards).
#[derive(Clone)]
pub struct RemotePeer {
    /// The peer's protocol-level identity.
    pub virtual_address: u16,
    /// Last-known network address, if any.
    pub address: Option<SocketAddr>,
    /// The peer's long-term static public key.
    pub public_key: VerifyingKey,
}

impl RemotePeer {
    /// Describe a remote peer from an already-loaded public key.
    pub fn new(
        virtual_address: u16,
        address: Option<SocketAddr>,
        public_key: VerifyingKey,
    ) -> Self {
        Self {
            virtual_address,
            address,
            public_key,
        }
    }

    /// Describe a remote peer from raw public-key bytes.
    pub fn from_key_bytes(
        virtual_address: u16,
        address: Option<SocketAddr>,
        key: &[u8],
    ) -> Result<Self, ConnError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            key.try_into().map_err(|_| ConnError::KeyMaterialMissing)?;
        let public_key =
            VerifyingKey::from_bytes(&bytes).map_err(|_| ConnError::KeyMaterialMissing)?;
        Ok(Self::new(virtual_address, address, public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_endpoint_from_bytes() {
        let bind = "127.0.0.1:0".parse().unwrap();
        let ep = LocalEndpoint::from_key_bytes(7, bind, &[0x11; 32]).unwrap();
        assert_eq!(ep.virtual_address, 7);

        // Wrong length is rejected before any loop starts.
        assert!(matches!(
            LocalEndpoint::from_key_bytes(7, bind, &[0x11; 31]),
            Err(ConnError::KeyMaterialMissing)
        ));
    }

    #[test]
    fn remote_peer_from_bytes() {
        let signing = SigningKey::from_bytes(&[0x22; 32]);
        let public = signing.verifying_key().to_bytes();
        let peer = RemotePeer::from_key_bytes(1001, None, &public).unwrap();
        assert_eq!(peer.virtual_address, 1001);
        assert!(peer.address.is_none());

        assert!(matches!(
            RemotePeer::from_key_bytes(1001, None, &[0u8; 16]),
            Err(ConnError::KeyMaterialMissing)
        ));
    }
}
