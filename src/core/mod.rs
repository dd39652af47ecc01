//! Core constants, error types and endpoint descriptors.
//!
//! Everything in this module is shared by the wire codec, the crypto
//! layer and both connection roles.

mod constants;
mod endpoint;
mod error;

pub use constants::*;
pub use endpoint::{LocalEndpoint, RemotePeer};
pub use error::{ConnError, PacketError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix milliseconds, as carried in headers.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
