//! Result store.
//!
//! # Data Flow
//! ```text
//! Scheduler task (single writer per target)
//!     → append(outcome)       clone-on-write of the target's History
//!     → publish_health(snap)  latest state machine snapshot
//!
//! Dashboard / CLI (any number of readers)
//!     → recent / uptime_ratio / stats / health
//!     → lock-free load of the current snapshot
//! ```
//!
//! # Design Decisions
//! - Each target slot holds its history behind an `ArcSwap`: readers never
//!   block the writer and never observe a half-applied append
//! - The slot map itself is a `DashMap`; slots are only inserted or
//!   removed when the registry changes

pub mod history;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;

use crate::health::outcome::Outcome;
use crate::health::state::{HealthSnapshot, HealthState};

pub use history::{History, TargetStats};

/// Default number of outcomes kept per target.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
struct TargetSlot {
    history: ArcSwap<History>,
    health: ArcSwap<HealthSnapshot>,
}

impl TargetSlot {
    fn new(capacity: usize) -> Self {
        Self {
            history: ArcSwap::from_pointee(History::new(capacity)),
            health: ArcSwap::from_pointee(HealthSnapshot::default()),
        }
    }
}

/// Per-target outcome history and published health state.
#[derive(Debug)]
pub struct ResultStore {
    capacity: usize,
    slots: DashMap<String, Arc<TargetSlot>>,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ensure a slot exists for `key`.
    pub fn register(&self, key: &str) {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TargetSlot::new(self.capacity)));
    }

    pub fn remove(&self, key: &str) {
        self.slots.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    fn slot(&self, key: &str) -> Option<Arc<TargetSlot>> {
        self.slots.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn slot_or_insert(&self, key: &str) -> Arc<TargetSlot> {
        match self.slot(key) {
            Some(slot) => slot,
            None => {
                self.register(key);
                self.slot(key)
                    .unwrap_or_else(|| Arc::new(TargetSlot::new(self.capacity)))
            }
        }
    }

    /// Append an outcome in arrival order.
    pub fn append(&self, key: &str, outcome: Arc<Outcome>) {
        let slot = self.slot_or_insert(key);
        slot.history.rcu(|current| {
            let mut next = History::clone(current);
            next.push(outcome.clone());
            next
        });
    }

    pub fn publish_health(&self, key: &str, snapshot: HealthSnapshot) {
        self.slot_or_insert(key).health.store(Arc::new(snapshot));
    }

    /// Consistent snapshot of a target's history.
    pub fn snapshot(&self, key: &str) -> Option<Arc<History>> {
        self.slot(key).map(|slot| slot.history.load_full())
    }

    pub fn recent(&self, key: &str, limit: usize) -> Option<Vec<Arc<Outcome>>> {
        self.snapshot(key).map(|h| h.recent(limit))
    }

    pub fn uptime_ratio(&self, key: &str, window: Option<Duration>) -> Option<f64> {
        self.snapshot(key)?.uptime_ratio(window, Utc::now())
    }

    pub fn latency_percentile(&self, key: &str, percentile: f64) -> Option<Duration> {
        self.snapshot(key)?.latency_percentile(percentile)
    }

    pub fn stats(&self, key: &str) -> Option<TargetStats> {
        self.snapshot(key).map(|h| h.stats())
    }

    pub fn health(&self, key: &str) -> Option<HealthSnapshot> {
        self.slot(key).map(|slot| HealthSnapshot::clone(&slot.health.load()))
    }

    pub fn state(&self, key: &str) -> Option<HealthState> {
        self.slot(key).map(|slot| slot.health.load().state)
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn outcome(i: u64) -> Arc<Outcome> {
        Arc::new(Outcome::success(Duration::from_millis(i), None))
    }

    #[test]
    fn test_append_and_evict() {
        let store = ResultStore::new(3);
        store.register("api");
        for i in 0..5 {
            store.append("api", outcome(i));
        }
        let latencies: Vec<_> = store
            .recent("api", 10)
            .unwrap()
            .iter()
            .map(|o| o.latency.as_millis())
            .collect();
        assert_eq!(latencies, vec![2, 3, 4]);
        assert!(store.recent("missing", 10).is_none());
    }

    #[test]
    fn test_health_snapshot_published() {
        let store = ResultStore::default();
        store.register("api");
        assert_eq!(store.state("api"), Some(HealthState::Unknown));

        store.publish_health(
            "api",
            HealthSnapshot {
                state: HealthState::Down,
                ..HealthSnapshot::default()
            },
        );
        assert_eq!(store.state("api"), Some(HealthState::Down));

        store.remove("api");
        assert!(store.health("api").is_none());
    }

    #[test]
    fn test_readers_see_whole_appends() {
        let store = Arc::new(ResultStore::new(50));
        store.register("api");

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    store.append("api", outcome(i));
                }
            })
        };

        let mut last_len = 0;
        for _ in 0..2_000 {
            let snapshot = store.snapshot("api").unwrap();
            let latencies: Vec<_> = snapshot.iter().map(|o| o.latency).collect();
            assert!(latencies.windows(2).all(|w| w[0] < w[1]), "history out of order");
            assert!(snapshot.len() >= last_len);
            last_len = snapshot.len();
        }
        writer.join().unwrap();
        assert_eq!(store.snapshot("api").unwrap().len(), 50);
    }
}
