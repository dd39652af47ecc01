//! Per-peer epoch table.
//!
//! A peer holds at most one *current* epoch (usable for traffic) and one
//! *pending* epoch (awaiting handshake completion). The strict
//! single-pending policy prevents key confusion under concurrent handshake
//! retries and bounds memory to two live exchange handles.

use crate::core::PacketError;

use super::Dhss;

/// Key ratchet: the current and pending key generations of one peer.
#[derive(Default)]
pub struct EpochTable {
    current: Option<(u32, Dhss)>,
    pending: Option<(u32, Dhss)>,
}

impl EpochTable {
    /// An empty table: no epoch promoted, none pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active encryption context, if any epoch has been promoted.
    pub fn current(&self) -> Option<(u32, &Dhss)> {
        self.current.as_ref().map(|(id, dhss)| (*id, dhss))
    }

    /// The in-flight epoch awaiting handshake completion.
    pub fn pending(&self) -> Option<(u32, &Dhss)> {
        self.pending.as_ref().map(|(id, dhss)| (*id, dhss))
    }

    /// Mutable access to the pending exchange (for derivation).
    pub fn pending_mut(&mut self) -> Option<(u32, &mut Dhss)> {
        self.pending.as_mut().map(|(id, dhss)| (*id, dhss))
    }

    /// Create a fresh key-exchange handle for `epoch` and mark it pending.
    ///
    /// Fails with [`PacketError::PendingEpochExists`] while another epoch
    /// is pending, and with [`PacketError::InvalidEpoch`] if `epoch` would
    /// collide with the current one.
    pub fn create(&mut self, epoch: u32) -> Result<&mut Dhss, PacketError> {
        if self.pending.is_some() {
            return Err(PacketError::PendingEpochExists);
        }
        if matches!(self.current, Some((id, _)) if id == epoch) {
            return Err(PacketError::InvalidEpoch(epoch));
        }
        let (_, dhss) = self.pending.insert((epoch, Dhss::generate()));
        Ok(dhss)
    }

    /// Promote the pending epoch to current, discarding the previous
    /// current key material.
    ///
    /// `epoch` must match the pending id: [`PacketError::NoSuchPending`]
    /// when nothing is pending, [`PacketError::InvalidEpoch`] on mismatch.
    pub fn promote(&mut self, epoch: u32) -> Result<(), PacketError> {
        match self.pending {
            None => Err(PacketError::NoSuchPending),
            Some((id, _)) if id != epoch => Err(PacketError::InvalidEpoch(epoch)),
            Some(_) => {
                self.current = self.pending.take();
                Ok(())
            }
        }
    }

    /// Drop the pending epoch, if any (rotation retry exhaustion).
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// The epoch id the next rotation should use.
    pub fn next_epoch(&self) -> u32 {
        self.current
            .as_ref()
            .map(|(id, _)| id.saturating_add(1))
            .unwrap_or(0)
    }
}
