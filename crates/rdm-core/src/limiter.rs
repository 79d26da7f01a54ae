//! Caller-owned, shareable download speed cap.
//!
//! One `SpeedLimiter` may be attached to many downloads at once. Changing the
//! requested speed notifies every pump currently subscribed, which then
//! recomputes its share of the limit before its next write.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::control::{ChangeNotifier, Subscription};

/// Lowest effective limit; smaller requests are raised to this.
pub const MINIMUM_SPEED_LIMIT: u64 = 256 << 10;

#[derive(Debug)]
pub struct SpeedLimiter {
    /// Requested bytes per second; 0 = unlimited.
    requested: AtomicU64,
    floor: u64,
    changes: ChangeNotifier,
}

impl SpeedLimiter {
    /// `None` or `Some(0)` means unlimited.
    pub fn new(bytes_per_sec: Option<u64>) -> Self {
        Self::with_floor(bytes_per_sec, MINIMUM_SPEED_LIMIT)
    }

    /// Like `new` with a custom minimum effective limit.
    pub fn with_floor(bytes_per_sec: Option<u64>, floor: u64) -> Self {
        Self {
            requested: AtomicU64::new(bytes_per_sec.unwrap_or(0)),
            floor,
            changes: ChangeNotifier::new(),
        }
    }

    /// Speed the caller asked for, `None` when unlimited.
    pub fn requested(&self) -> Option<u64> {
        match self.requested.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    /// Limit the pumps actually enforce: the request raised to the floor.
    pub fn effective(&self) -> Option<u64> {
        self.requested().map(|n| n.max(self.floor).max(1))
    }

    /// Change the requested speed and notify subscribed pumps.
    pub fn set_requested(&self, bytes_per_sec: Option<u64>) {
        self.requested
            .store(bytes_per_sec.unwrap_or(0), Ordering::Release);
        tracing::debug!(requested = ?self.requested(), "speed limit changed");
        self.changes.notify();
    }

    pub fn subscribe(&self) -> Subscription {
        self.changes.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }
}

impl Default for SpeedLimiter {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_unlimited() {
        let l = SpeedLimiter::new(Some(0));
        assert_eq!(l.requested(), None);
        assert_eq!(l.effective(), None);
    }

    #[test]
    fn effective_is_raised_to_floor() {
        let l = SpeedLimiter::new(Some(1000));
        assert_eq!(l.requested(), Some(1000));
        assert_eq!(l.effective(), Some(MINIMUM_SPEED_LIMIT));

        let l = SpeedLimiter::with_floor(Some(1000), 0);
        assert_eq!(l.effective(), Some(1000));
    }

    #[test]
    fn change_notifies_subscribers() {
        let l = SpeedLimiter::new(None);
        let sub = l.subscribe();
        l.set_requested(Some(1 << 20));
        assert!(sub.take_changed());
        assert_eq!(l.effective(), Some(1 << 20));
        l.set_requested(Some(0));
        assert!(sub.take_changed());
        assert_eq!(l.effective(), None);
    }

    #[test]
    fn dropped_subscription_detaches() {
        let l = SpeedLimiter::new(None);
        let sub = l.subscribe();
        assert_eq!(l.subscriber_count(), 1);
        drop(sub);
        assert_eq!(l.subscriber_count(), 0);
    }
}
