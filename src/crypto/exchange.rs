//! Ephemeral key exchange and data-frame AEAD.
//!
//! A [`Dhss`] handle owns one ephemeral X25519 keypair. Supplying the
//! counterpart's public key consumes the secret and derives a
//! [`SessionKey`]; the type system enforces that exactly one derivation
//! happens per handle.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroize;

use crate::core::{PacketError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, PUBLIC_KEY_SIZE};

/// Size of a derived session key (XChaCha20).
pub const SESSION_KEY_SIZE: usize = 32;

/// HKDF info label for the data-key expansion.
const DATA_KEY_LABEL: &[u8] = b"sudp v1 data key";

/// A derived symmetric session key, zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }

    /// Encrypt a payload, producing `nonce-tail ciphertext` with the tag
    /// appended. The nonce is freshly random per frame.
    pub fn seal(
        &self,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<([u8; AEAD_NONCE_SIZE], Vec<u8>), PacketError> {
        use rand::RngCore;

        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let cipher = XChaCha20Poly1305::new(self.as_bytes().into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| PacketError::DataIntegrityFailure)?;
        Ok((nonce, ciphertext))
    }

    /// Decrypt a sealed payload. Any tag or AAD mismatch fails.
    pub fn open(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, PacketError> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(PacketError::DataIntegrityFailure);
        }
        let cipher = XChaCha20Poly1305::new(self.as_bytes().into());
        cipher
            .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| PacketError::DataIntegrityFailure)
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// One epoch's key-exchange handle: an ephemeral X25519 keypair plus, once
/// derived, the symmetric session key.
pub struct Dhss {
    secret: Option<EphemeralSecret>,
    public: PublicKey,
    session: Option<SessionKey>,
}

impl Dhss {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret: Some(secret),
            public,
            session: None,
        }
    }

    /// This handle's ephemeral public key, as carried in handshake frames.
    pub fn public(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.public.as_bytes()
    }

    /// Derive the shared session key from the counterpart's ephemeral
    /// public key. Consumes the ephemeral secret; a second call fails with
    /// [`PacketError::AlreadyDerived`].
    pub fn derive(&mut self, counterpart: &[u8; PUBLIC_KEY_SIZE]) -> Result<(), PacketError> {
        let secret = self.secret.take().ok_or(PacketError::AlreadyDerived)?;
        let shared = secret.diffie_hellman(&PublicKey::from(*counterpart));

        let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; SESSION_KEY_SIZE];
        hkdf.expand(DATA_KEY_LABEL, &mut key)
            .map_err(|_| PacketError::DataIntegrityFailure)?;

        self.session = Some(SessionKey::from_bytes(key));
        key.zeroize();
        Ok(())
    }

    /// The derived session key, if `derive` has run.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session.as_ref()
    }

    /// Whether the shared secret has been derived.
    pub fn is_derived(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_identical_keys() {
        let mut alice = Dhss::generate();
        let mut bob = Dhss::generate();

        let alice_pub = *alice.public();
        let bob_pub = *bob.public();

        alice.derive(&bob_pub).unwrap();
        bob.derive(&alice_pub).unwrap();

        assert_eq!(
            alice.session_key().unwrap().as_bytes(),
            bob.session_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn second_derivation_is_rejected() {
        let mut alice = Dhss::generate();
        let bob = Dhss::generate();

        alice.derive(bob.public()).unwrap();
        assert_eq!(
            alice.derive(bob.public()),
            Err(PacketError::AlreadyDerived)
        );
        // The first derivation survives.
        assert!(alice.is_derived());
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        let aad = b"header bytes";
        let (nonce, ciphertext) = key.seal(aad, b"hello").unwrap();

        assert_eq!(ciphertext.len(), 5 + AEAD_TAG_SIZE);
        assert_eq!(key.open(&nonce, aad, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn open_rejects_corruption_and_wrong_aad() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        let (nonce, mut ciphertext) = key.seal(b"aad", b"payload").unwrap();

        assert_eq!(
            key.open(&nonce, b"other aad", &ciphertext),
            Err(PacketError::DataIntegrityFailure)
        );

        ciphertext[0] ^= 0x01;
        assert_eq!(
            key.open(&nonce, b"aad", &ciphertext),
            Err(PacketError::DataIntegrityFailure)
        );
    }

    #[test]
    fn distinct_exchanges_yield_distinct_keys() {
        let mut a1 = Dhss::generate();
        let mut a2 = Dhss::generate();
        let b = Dhss::generate();

        a1.derive(b.public()).unwrap();
        a2.derive(b.public()).unwrap();

        assert_ne!(
            a1.session_key().unwrap().as_bytes(),
            a2.session_key().unwrap().as_bytes()
        );
    }
}
