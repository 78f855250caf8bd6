//! TTL-keyed suppression tables.
//!
//! A guard remembers when each key was last recorded and reports a hit while
//! the key is younger than its TTL. Tables are plain data; the owning
//! component decides how to share them.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Expired entries are pruned once a table grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug)]
pub struct TtlGuard<K> {
    ttl: Duration,
    seen: HashMap<K, Instant>,
}

impl<K: Eq + Hash> TtlGuard<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Whether `key` was recorded less than one TTL before `now`.
    pub fn is_hit(&self, key: &K, now: Instant) -> bool {
        self.seen
            .get(key)
            .map(|at| now.saturating_duration_since(*at) < self.ttl)
            .unwrap_or(false)
    }

    pub fn record(&mut self, key: K, now: Instant) {
        if self.seen.len() >= PRUNE_THRESHOLD {
            self.prune(now);
        }
        self.seen.insert(key, now);
    }

    /// Returns `true` (vetoed) on a hit; otherwise records `key` and returns
    /// `false`.
    pub fn check_and_record(&mut self, key: K, now: Instant) -> bool {
        if self.is_hit(&key, now) {
            return true;
        }
        self.record(key, now);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < ttl);
    }
}

/// Most recently observed sender, used to backfill attribution.
#[derive(Debug)]
pub struct RecentSender {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl RecentSender {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn observe(&mut self, name: &str, now: Instant) {
        self.last = Some((name.to_string(), now));
    }

    /// The last sender if it was seen within the freshness window.
    pub fn fresh(&self, now: Instant) -> Option<&str> {
        self.last
            .as_ref()
            .filter(|(_, at)| now.saturating_duration_since(*at) <= self.window)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let mut guard = TtlGuard::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(!guard.check_and_record("10".to_string(), t0));
        assert!(guard.is_hit(&"10".to_string(), t0 + Duration::from_secs(9)));
        assert!(!guard.is_hit(&"10".to_string(), t0 + Duration::from_secs(10)));
        assert!(!guard.is_hit(&"20".to_string(), t0));
    }

    #[test]
    fn test_hit_does_not_refresh() {
        let mut guard = TtlGuard::new(Duration::from_secs(10));
        let t0 = Instant::now();
        guard.record(7u32, t0);
        assert!(guard.check_and_record(7, t0 + Duration::from_secs(5)));
        // the vetoed observation did not move the timestamp
        assert!(!guard.check_and_record(7, t0 + Duration::from_secs(11)));
    }

    #[test]
    fn test_prune_drops_expired_only() {
        let mut guard = TtlGuard::new(Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            guard.record(i, t0);
        }
        let later = t0 + Duration::from_secs(5);
        guard.record(usize::MAX, later);
        assert_eq!(guard.len(), 1);
        assert!(guard.is_hit(&usize::MAX, later));
    }

    #[test]
    fn test_recent_sender_window() {
        let mut recent = RecentSender::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(recent.fresh(t0).is_none());
        recent.observe("영희", t0);
        assert_eq!(recent.fresh(t0 + Duration::from_secs(30)), Some("영희"));
        assert!(recent.fresh(t0 + Duration::from_secs(31)).is_none());
    }
}
