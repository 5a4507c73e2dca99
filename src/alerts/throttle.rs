//! Repeat-alert suppression.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alerts::record::AlertKind;

#[derive(Debug, Clone, Copy)]
struct Admitted {
    at: DateTime<Utc>,
    window: Duration,
}

impl Admitted {
    fn covers(&self, at: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.window) {
            Ok(window) => at < self.at + window,
            Err(_) => true,
        }
    }
}

/// Remembers the last admitted alert per target and direction.
///
/// Times are transition timestamps, so a replayed sequence is throttled
/// the same way regardless of when it is processed. Recovery alerts are
/// always admitted.
#[derive(Debug, Default)]
pub struct Throttle {
    admitted: HashMap<(String, AlertKind), Admitted>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an alert at `at` goes out, and remember it if so.
    pub fn admit(&mut self, key: &str, kind: AlertKind, at: DateTime<Utc>, window: Duration) -> bool {
        self.evict(at);

        if kind == AlertKind::Recovery {
            return true;
        }

        let slot = (key.to_string(), kind);
        if self.admitted.get(&slot).is_some_and(|prev| prev.covers(at)) {
            return false;
        }
        self.admitted.insert(slot, Admitted { at, window });
        true
    }

    /// Forget entries whose window has passed.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        self.admitted.retain(|_, admitted| admitted.covers(now));
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn test_repeat_within_window_suppressed() {
        let mut throttle = Throttle::new();
        assert!(throttle.admit("api", AlertKind::Down, at(0), FIVE_MIN));
        assert!(!throttle.admit("api", AlertKind::Down, at(120), FIVE_MIN));
        assert!(throttle.admit("api", AlertKind::Down, at(300), FIVE_MIN));
    }

    #[test]
    fn test_keys_and_directions_are_independent() {
        let mut throttle = Throttle::new();
        assert!(throttle.admit("api", AlertKind::Down, at(0), FIVE_MIN));
        assert!(throttle.admit("db", AlertKind::Down, at(1), FIVE_MIN));
        assert!(throttle.admit("api", AlertKind::Degraded, at(2), FIVE_MIN));
        assert_eq!(throttle.len(), 3);
    }

    #[test]
    fn test_recovery_always_admitted() {
        let mut throttle = Throttle::new();
        assert!(throttle.admit("api", AlertKind::Down, at(0), FIVE_MIN));
        assert!(throttle.admit("api", AlertKind::Recovery, at(10), FIVE_MIN));
        assert!(throttle.admit("api", AlertKind::Recovery, at(11), FIVE_MIN));
        assert!(!throttle.admit("api", AlertKind::Down, at(20), FIVE_MIN));
    }

    #[test]
    fn test_entries_evicted_after_window() {
        let mut throttle = Throttle::new();
        throttle.admit("api", AlertKind::Down, at(0), Duration::from_secs(60));
        throttle.admit("db", AlertKind::Down, at(0), FIVE_MIN);
        throttle.evict(at(61));
        assert_eq!(throttle.len(), 1);
        throttle.evict(at(301));
        assert!(throttle.is_empty());
    }
}
