//! Wire codec for SUDP frames.
//!
//! A datagram is a fixed 23-byte [`Header`] followed by one frame body.
//! Handshake and control bodies are fixed-size and signed with the
//! sender's long-term static key; data bodies carry an AEAD-sealed user
//! payload. Every body echoes the header checksum, binding it to the
//! header it arrived under.

mod frame;
mod header;

pub use frame::{
    decode_control, decode_data, decode_handshake, encode_control, encode_data, encode_handshake,
    ControlFlags,
};
pub use header::{FrameType, Header};

use crate::core::{PacketError, HEADER_SIZE, MAX_BODY_SIZE};

/// Split a raw datagram into its header and body.
///
/// The body length must match the header's `length` field exactly and fit
/// the frame budget; anything else is an [`PacketError::InvalidHeader`].
pub fn decode_datagram(datagram: &[u8]) -> Result<(Header, &[u8]), PacketError> {
    let header = Header::decode(datagram)?;
    let body = &datagram[HEADER_SIZE..];
    if body.len() != header.length as usize || body.len() > MAX_BODY_SIZE {
        return Err(PacketError::InvalidHeader);
    }
    Ok((header, body))
}
