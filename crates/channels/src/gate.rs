//! Send-channel pacing state for the room chat.
//!
//! Tracks when the last message went out and until when the room asked us to
//! hold off. Callers ask how long they still have to wait, sleep, and record
//! the outcome; exclusivity is provided by whoever owns the gate.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SendGate {
    /// Minimum spacing between two successful sends.
    min_interval: Duration,
    /// Last successful send.
    last_send: Option<Instant>,
    /// End of the cooldown signalled by the room's rate-limit indicator.
    cooldown_until: Option<Instant>,
}

impl SendGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
            cooldown_until: None,
        }
    }

    /// Time left in the external cooldown window, if any.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Time left before the minimum inter-send gap has elapsed, if any.
    pub fn gap_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_send?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_interval {
            Some(self.min_interval - elapsed)
        } else {
            None
        }
    }

    /// Pushes the cooldown window to `now + by`.
    pub fn extend_cooldown(&mut self, now: Instant, by: Duration) {
        self.cooldown_until = Some(now + by);
    }

    pub fn record_send(&mut self, now: Instant) {
        self.last_send = Some(now);
    }
}
