//! Frame body encoding and decoding.
//!
//! Handshake and control bodies are signed with the sender's static key
//! over `checksum ‖ content`; data bodies are sealed with the current
//! epoch's session key, using the encoded header as AAD. Decoders check
//! the checksum before the signature, and both before any state is
//! touched.
//!
//! Body layouts:
//! ```text
//! Handshake (100):  [ checksum (4) | ephemeral pubkey (32) | signature (64) ]
//! Control   (69):   [ checksum (4) | flags (1)             | signature (64) ]
//! Data (44 + n):    [ checksum (4) | nonce (24)            | ciphertext (n + 16) ]
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::core::{
    PacketError, AEAD_NONCE_SIZE, CHECKSUM_SIZE, CTRL_MESSAGE_SIZE, HANDSHAKE_SIZE,
    MAX_PAYLOAD_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
use crate::crypto::{self, SessionKey};

use super::{FrameType, Header};

/// Control frame flag bits. Flags may combine, though the current
/// protocol only ever sets one per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFlags(u8);

impl ControlFlags {
    /// Liveness probe.
    pub const KEEP_ALIVE: Self = Self(0x01);
    /// Reply to a liveness probe.
    pub const KEEP_ALIVE_ACK: Self = Self(0x02);
    /// Acknowledges a completed handshake; promotes the pending epoch.
    pub const EPOCH_ACK: Self = Self(0x04);

    /// Reconstruct flags from their wire byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Wire byte.
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Whether the keepalive bit is set.
    pub fn is_keep_alive(self) -> bool {
        self.0 & Self::KEEP_ALIVE.0 != 0
    }

    /// Whether the keepalive-ack bit is set.
    pub fn is_keep_alive_ack(self) -> bool {
        self.0 & Self::KEEP_ALIVE_ACK.0 != 0
    }

    /// Whether the epoch-ack bit is set.
    pub fn is_epoch_ack(self) -> bool {
        self.0 & Self::EPOCH_ACK.0 != 0
    }
}

/// Encode a signed handshake datagram carrying an ephemeral public key.
pub fn encode_handshake(
    frame_type: FrameType,
    epoch: u32,
    src: u16,
    dst: u16,
    ephemeral_public: &[u8; PUBLIC_KEY_SIZE],
    signing_key: &SigningKey,
) -> Vec<u8> {
    let mut header = Header::new(frame_type, epoch, src, dst);
    header.length = HANDSHAKE_SIZE as u16;
    header.seal_checksum(ephemeral_public);

    let mut body = Vec::with_capacity(HANDSHAKE_SIZE);
    body.extend_from_slice(&header.checksum.to_le_bytes());
    body.extend_from_slice(ephemeral_public);
    let signature = crypto::sign(signing_key, &body);
    body.extend_from_slice(&signature);

    let mut datagram = header.encode().to_vec();
    datagram.extend_from_slice(&body);
    datagram
}

/// Decode and authenticate a handshake body, yielding the sender's
/// ephemeral public key.
pub fn decode_handshake(
    header: &Header,
    body: &[u8],
    peer_key: &VerifyingKey,
) -> Result<[u8; PUBLIC_KEY_SIZE], PacketError> {
    if body.len() != HANDSHAKE_SIZE {
        return Err(PacketError::InvalidHeader);
    }
    let carried = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let mut ephemeral = [0u8; PUBLIC_KEY_SIZE];
    ephemeral.copy_from_slice(&body[CHECKSUM_SIZE..CHECKSUM_SIZE + PUBLIC_KEY_SIZE]);

    header.verify_checksum(carried, &ephemeral)?;

    let signed = &body[..CHECKSUM_SIZE + PUBLIC_KEY_SIZE];
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&body[CHECKSUM_SIZE + PUBLIC_KEY_SIZE..]);
    crypto::verify(peer_key, signed, &signature)?;

    Ok(ephemeral)
}

/// Encode a signed control datagram.
pub fn encode_control(
    epoch: u32,
    src: u16,
    dst: u16,
    flags: ControlFlags,
    signing_key: &SigningKey,
) -> Vec<u8> {
    let mut header = Header::new(FrameType::CtrlMessage, epoch, src, dst);
    header.length = CTRL_MESSAGE_SIZE as u16;
    header.seal_checksum(&[flags.as_byte()]);

    let mut body = Vec::with_capacity(CTRL_MESSAGE_SIZE);
    body.extend_from_slice(&header.checksum.to_le_bytes());
    body.push(flags.as_byte());
    let signature = crypto::sign(signing_key, &body);
    body.extend_from_slice(&signature);

    let mut datagram = header.encode().to_vec();
    datagram.extend_from_slice(&body);
    datagram
}

/// Decode and authenticate a control body, yielding its flags.
pub fn decode_control(
    header: &Header,
    body: &[u8],
    peer_key: &VerifyingKey,
) -> Result<ControlFlags, PacketError> {
    if body.len() != CTRL_MESSAGE_SIZE {
        return Err(PacketError::InvalidHeader);
    }
    let carried = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let flags = ControlFlags::from_byte(body[CHECKSUM_SIZE]);

    header.verify_checksum(carried, &[flags.as_byte()])?;

    let signed = &body[..CHECKSUM_SIZE + 1];
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&body[CHECKSUM_SIZE + 1..]);
    crypto::verify(peer_key, signed, &signature)?;

    Ok(flags)
}

/// Encode an encrypted data datagram. The checksum covers the
/// pre-encryption payload; the encoded header doubles as the AEAD AAD.
pub fn encode_data(
    epoch: u32,
    src: u16,
    dst: u16,
    payload: &[u8],
    key: &SessionKey,
) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }

    let mut header = Header::new(FrameType::Data, epoch, src, dst);
    header.length = (CHECKSUM_SIZE + AEAD_NONCE_SIZE + payload.len() + crate::core::AEAD_TAG_SIZE)
        as u16;
    header.seal_checksum(payload);

    let aad = header.encode();
    let (nonce, ciphertext) = key.seal(&aad, payload)?;

    let mut datagram = aad.to_vec();
    datagram.extend_from_slice(&header.checksum.to_le_bytes());
    datagram.extend_from_slice(&nonce);
    datagram.extend_from_slice(&ciphertext);
    Ok(datagram)
}

/// Decrypt and verify a data body, yielding the user payload.
pub fn decode_data(
    header: &Header,
    body: &[u8],
    key: &SessionKey,
) -> Result<Vec<u8>, PacketError> {
    if body.len() < CHECKSUM_SIZE + AEAD_NONCE_SIZE + crate::core::AEAD_TAG_SIZE {
        return Err(PacketError::InvalidHeader);
    }
    let carried = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce.copy_from_slice(&body[CHECKSUM_SIZE..CHECKSUM_SIZE + AEAD_NONCE_SIZE]);
    let ciphertext = &body[CHECKSUM_SIZE + AEAD_NONCE_SIZE..];

    let aad = header.encode();
    let payload = key.open(&nonce, &aad, ciphertext)?;

    header.verify_checksum(carried, &payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
    use crate::crypto::{generate_signing_key, Dhss};
    use crate::wire::decode_datagram;

    fn session_pair() -> (SessionKey, SessionKey) {
        let mut a = Dhss::generate();
        let mut b = Dhss::generate();
        let (pa, pb) = (*a.public(), *b.public());
        a.derive(&pb).unwrap();
        b.derive(&pa).unwrap();
        (a.session_key().unwrap().clone(), b.session_key().unwrap().clone())
    }

    #[test]
    fn control_flags_bits() {
        assert!(ControlFlags::KEEP_ALIVE.is_keep_alive());
        assert!(!ControlFlags::KEEP_ALIVE.is_epoch_ack());
        assert!(ControlFlags::EPOCH_ACK.is_epoch_ack());

        let combined =
            ControlFlags::from_byte(ControlFlags::KEEP_ALIVE.as_byte() | ControlFlags::EPOCH_ACK.as_byte());
        assert!(combined.is_keep_alive());
        assert!(combined.is_epoch_ack());
        assert!(!combined.is_keep_alive_ack());
    }

    #[test]
    fn handshake_roundtrip() {
        let signing = generate_signing_key();
        let dhss = Dhss::generate();

        let datagram =
            encode_handshake(FrameType::ClientHandshake, 0, 7, 1001, dhss.public(), &signing);
        let (header, body) = decode_datagram(&datagram).unwrap();

        assert_eq!(header.frame_type, FrameType::ClientHandshake);
        assert_eq!(header.epoch, 0);
        assert_eq!(header.src, 7);
        assert_eq!(header.dst, 1001);

        let ephemeral = decode_handshake(&header, body, &signing.verifying_key()).unwrap();
        assert_eq!(&ephemeral, dhss.public());
    }

    #[test]
    fn handshake_single_bit_corruption_fails_checksum() {
        let signing = generate_signing_key();
        let dhss = Dhss::generate();
        let mut datagram =
            encode_handshake(FrameType::ClientHandshake, 0, 7, 1001, dhss.public(), &signing);

        // Flip one bit of the carried ephemeral key.
        datagram[HEADER_SIZE + CHECKSUM_SIZE] ^= 0x01;

        let (header, body) = decode_datagram(&datagram).unwrap();
        assert!(matches!(
            decode_handshake(&header, body, &signing.verifying_key()),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn handshake_wrong_signer_fails() {
        let signing = generate_signing_key();
        let other = generate_signing_key();
        let dhss = Dhss::generate();

        let datagram =
            encode_handshake(FrameType::ClientHandshake, 0, 7, 1001, dhss.public(), &signing);
        let (header, body) = decode_datagram(&datagram).unwrap();

        assert_eq!(
            decode_handshake(&header, body, &other.verifying_key()),
            Err(PacketError::BadSignature)
        );
    }

    #[test]
    fn control_roundtrip() {
        let signing = generate_signing_key();
        let datagram = encode_control(2, 7, 1001, ControlFlags::EPOCH_ACK, &signing);
        let (header, body) = decode_datagram(&datagram).unwrap();

        assert_eq!(header.frame_type, FrameType::CtrlMessage);
        let flags = decode_control(&header, body, &signing.verifying_key()).unwrap();
        assert!(flags.is_epoch_ack());
    }

    #[test]
    fn control_flag_corruption_fails_checksum() {
        let signing = generate_signing_key();
        let mut datagram = encode_control(2, 7, 1001, ControlFlags::KEEP_ALIVE, &signing);
        datagram[HEADER_SIZE + CHECKSUM_SIZE] ^= 0x02;

        let (header, body) = decode_datagram(&datagram).unwrap();
        assert!(matches!(
            decode_control(&header, body, &signing.verifying_key()),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn data_roundtrip() {
        let (key_a, key_b) = session_pair();
        let datagram = encode_data(1, 7, 1001, b"hello", &key_a).unwrap();
        let (header, body) = decode_datagram(&datagram).unwrap();

        assert_eq!(header.frame_type, FrameType::Data);
        assert_eq!(header.epoch, 1);
        assert_eq!(decode_data(&header, body, &key_b).unwrap(), b"hello");
    }

    #[test]
    fn data_ciphertext_corruption_fails_integrity() {
        let (key_a, key_b) = session_pair();
        let mut datagram = encode_data(1, 7, 1001, b"hello", &key_a).unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0x80;

        let (header, body) = decode_datagram(&datagram).unwrap();
        assert_eq!(
            decode_data(&header, body, &key_b),
            Err(PacketError::DataIntegrityFailure)
        );
    }

    #[test]
    fn data_wrong_key_fails_integrity() {
        let (key_a, _) = session_pair();
        let (_, other) = session_pair();
        let datagram = encode_data(1, 7, 1001, b"hello", &key_a).unwrap();
        let (header, body) = decode_datagram(&datagram).unwrap();

        assert_eq!(
            decode_data(&header, body, &other),
            Err(PacketError::DataIntegrityFailure)
        );
    }

    #[test]
    fn data_rejects_oversized_payload() {
        let (key, _) = session_pair();
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            encode_data(0, 7, 1001, &payload, &key),
            Err(PacketError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1))
        );
    }

    #[test]
    fn data_max_payload_fits_the_budget() {
        let (key, _) = session_pair();
        let payload = vec![0u8; MAX_PAYLOAD_SIZE];
        let datagram = encode_data(0, 7, 1001, &payload, &key).unwrap();
        assert!(datagram.len() <= crate::core::MAX_DATAGRAM_SIZE);
    }
}
