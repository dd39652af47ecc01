//! Anti-replay time window.
//!
//! No clock synchronization is attempted. The first authenticated packet
//! from a peer fixes the offset between its clock and ours; every later
//! packet must carry a timestamp within [`TIME_WINDOW`] of that learned
//! offset. Replayed frames captured outside the window are rejected before
//! any state changes.

use crate::core::{unix_millis, TIME_WINDOW};

/// Learned clock offset of one peer, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct TimeSync {
    offset: i64,
}

impl TimeSync {
    /// Learn the offset from the first authenticated timestamp.
    pub fn new(timestamp: u64) -> Self {
        Self::at(timestamp, unix_millis())
    }

    fn at(timestamp: u64, now: u64) -> Self {
        Self {
            offset: timestamp as i64 - now as i64,
        }
    }

    /// Whether `timestamp` falls within the accepted window around the
    /// learned offset.
    pub fn in_time(&self, timestamp: u64) -> bool {
        self.check(timestamp, unix_millis())
    }

    fn check(&self, timestamp: u64, now: u64) -> bool {
        let expected = now as i64 + self.offset;
        let deviation = (timestamp as i64 - expected).unsigned_abs();
        deviation <= TIME_WINDOW.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: u64 = TIME_WINDOW.as_millis() as u64;

    #[test]
    fn accepts_within_window() {
        let now = 1_700_000_000_000;
        let sync = TimeSync::at(now, now);

        assert!(sync.check(now + WINDOW_MS, now));
        assert!(sync.check(now.saturating_sub(WINDOW_MS), now));
    }

    #[test]
    fn rejects_outside_window() {
        let now = 1_700_000_000_000;
        let sync = TimeSync::at(now, now);

        assert!(!sync.check(now + WINDOW_MS + 1, now));
        assert!(!sync.check(now - WINDOW_MS - 1, now));
    }

    #[test]
    fn skewed_peer_clock_is_normalized() {
        // Peer clock runs five minutes ahead; the offset absorbs it.
        let now = 1_700_000_000_000;
        let skew = 5 * 60 * 1000;
        let sync = TimeSync::at(now + skew, now);

        let later = now + 42_000;
        assert!(sync.check(later + skew, later));
        // A replay stamped with the old skewed time fails once enough
        // local time has passed.
        assert!(!sync.check(now + skew, later));
    }
}
