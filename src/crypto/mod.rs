//! Cryptographic layer: static-key signing, ephemeral key exchange and the
//! per-peer epoch table.
//!
//! Long-term identities are Ed25519 keypairs; each epoch owns an ephemeral
//! X25519 exchange whose shared secret is expanded into an
//! XChaCha20-Poly1305 session key for data frames.

mod epochs;
mod exchange;

pub use epochs::EpochTable;
pub use exchange::{Dhss, SessionKey};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::core::{PacketError, SIGNATURE_SIZE};

/// Generate a fresh long-term Ed25519 signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Sign a frame body with the local static key.
pub fn sign(key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    key.sign(message).to_bytes()
}

/// Verify a frame body signature against a peer's static public key.
pub fn verify(
    key: &VerifyingKey,
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), PacketError> {
    let signature = Signature::from_bytes(signature);
    key.verify(message, &signature)
        .map_err(|_| PacketError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = generate_signing_key();
        let message = b"signed frame body";
        let signature = sign(&key, message);

        assert!(verify(&key.verifying_key(), message, &signature).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let key = generate_signing_key();
        let other = generate_signing_key();
        let signature = sign(&key, b"body");

        assert_eq!(
            verify(&other.verifying_key(), b"body", &signature),
            Err(PacketError::BadSignature)
        );
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let key = generate_signing_key();
        let signature = sign(&key, b"body");

        assert_eq!(
            verify(&key.verifying_key(), b"tampered", &signature),
            Err(PacketError::BadSignature)
        );
    }
}
