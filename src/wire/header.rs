//! Header encoding and decoding.
//!
//! Wire format (23 bytes, little-endian):
//! ```text
//! +--------+------------+--------+--------+--------+------------------+------------+
//! | Type   | Epoch      | Src    | Dst    | Length | Timestamp        | Checksum   |
//! | 1 byte | 4 (LE32)   | 2 LE16 | 2 LE16 | 2 LE16 | 8 bytes (LE64)   | 4 (LE32)   |
//! +--------+------------+--------+--------+--------+------------------+------------+
//! ```
//! The checksum is a CRC32 over the first 19 header bytes plus the frame's
//! authenticated content, computed before the checksum field is written.

use crate::core::{unix_millis, PacketError, HEADER_SIZE};

/// Offset of the checksum field inside an encoded header.
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Handshake initiation carrying the client's ephemeral public key.
    ClientHandshake = 0x01,
    /// Handshake reply carrying the server's ephemeral public key.
    ServerHandshake = 0x02,
    /// Signed control frame (keepalive / epoch acknowledgment).
    CtrlMessage = 0x03,
    /// Encrypted user payload.
    Data = 0x04,
}

impl FrameType {
    /// Parse a frame type from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ClientHandshake),
            0x02 => Some(Self::ServerHandshake),
            0x03 => Some(Self::CtrlMessage),
            0x04 => Some(Self::Data),
            _ => None,
        }
    }

    /// Wire byte for this frame type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Common frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame type.
    pub frame_type: FrameType,
    /// Key-generation counter the frame belongs to.
    pub epoch: u32,
    /// Sender's virtual address.
    pub src: u16,
    /// Receiver's virtual address.
    pub dst: u16,
    /// Body length in bytes.
    pub length: u16,
    /// Sender wall-clock time, unix milliseconds.
    pub timestamp: u64,
    /// CRC32 over the header prefix and the frame's authenticated content.
    pub checksum: u32,
}

impl Header {
    /// Create a header with the current timestamp; length and checksum are
    /// filled in by the frame encoders.
    pub fn new(frame_type: FrameType, epoch: u32, src: u16, dst: u16) -> Self {
        Self {
            frame_type,
            epoch,
            src,
            dst,
            length: 0,
            timestamp: unix_millis(),
            checksum: 0,
        }
    }

    /// Serialize to the 23-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.frame_type.as_byte();
        buf[1..5].copy_from_slice(&self.epoch.to_le_bytes());
        buf[5..7].copy_from_slice(&self.src.to_le_bytes());
        buf[7..9].copy_from_slice(&self.dst.to_le_bytes());
        buf[9..11].copy_from_slice(&self.length.to_le_bytes());
        buf[11..19].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[19..23].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse a header from the start of a datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::InvalidHeader);
        }
        let frame_type = FrameType::from_byte(bytes[0]).ok_or(PacketError::InvalidHeader)?;
        Ok(Self {
            frame_type,
            epoch: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            src: u16::from_le_bytes([bytes[5], bytes[6]]),
            dst: u16::from_le_bytes([bytes[7], bytes[8]]),
            length: u16::from_le_bytes([bytes[9], bytes[10]]),
            timestamp: u64::from_le_bytes([
                bytes[11], bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17],
                bytes[18],
            ]),
            checksum: u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]),
        })
    }

    /// CRC32 over the header prefix (checksum field excluded) and the
    /// frame's authenticated content.
    pub fn compute_checksum(&self, content: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.encode()[..CHECKSUM_OFFSET]);
        hasher.update(content);
        hasher.finalize()
    }

    /// Compute and store the checksum for the given content.
    pub fn seal_checksum(&mut self, content: &[u8]) {
        self.checksum = self.compute_checksum(content);
    }

    /// Recompute the checksum over `content` and match it against both the
    /// stored value and the value the body carried.
    pub fn verify_checksum(&self, carried: u32, content: &[u8]) -> Result<(), PacketError> {
        let computed = self.compute_checksum(content);
        if computed != self.checksum || carried != self.checksum {
            return Err(PacketError::ChecksumMismatch { carried, computed });
        }
        Ok(())
    }
}
