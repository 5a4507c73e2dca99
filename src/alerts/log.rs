//! Bounded in-memory alert history.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::alerts::record::AlertRecord;

/// Default number of alert records kept.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug)]
pub struct AlertLog {
    capacity: usize,
    records: Mutex<VecDeque<AlertRecord>>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, record: AlertRecord) {
        let mut records = self.records.lock().expect("alert log lock poisoned");
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Apply `f` to the record with `id`. Returns the updated record, or
    /// `None` if it has already been evicted.
    pub fn update<F>(&self, id: Uuid, f: F) -> Option<AlertRecord>
    where
        F: FnOnce(&mut AlertRecord),
    {
        let mut records = self.records.lock().expect("alert log lock poisoned");
        let record = records.iter_mut().rev().find(|r| r.id == id)?;
        f(record);
        Some(record.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<AlertRecord> {
        let records = self.records.lock().expect("alert log lock poisoned");
        records.iter().rev().find(|r| r.id == id).cloned()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        let records = self.records.lock().expect("alert log lock poisoned");
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Records for one target, newest first.
    pub fn for_target(&self, key: &str, limit: usize) -> Vec<AlertRecord> {
        let records = self.records.lock().expect("alert log lock poisoned");
        records
            .iter()
            .rev()
            .filter(|r| r.target_key == key)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("alert log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::record::AlertStatus;
    use crate::health::outcome::Outcome;
    use crate::health::state::{HealthState, Transition};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(key: &str) -> AlertRecord {
        AlertRecord::new(Transition {
            target_key: key.into(),
            from: HealthState::Down,
            to: HealthState::Up,
            at: Utc::now(),
            outcome: Arc::new(Outcome::success(Duration::from_millis(5), None)),
        })
    }

    #[test]
    fn test_bounded_newest_first() {
        let log = AlertLog::new(2);
        let first = record("a");
        let first_id = first.id;
        log.push(first);
        log.push(record("b"));
        log.push(record("c"));

        assert_eq!(log.len(), 2);
        assert!(log.get(first_id).is_none());
        let keys: Vec<_> = log.recent(10).into_iter().map(|r| r.target_key).collect();
        assert_eq!(keys, vec!["c", "b"]);
        assert_eq!(log.for_target("b", 10).len(), 1);
    }

    #[test]
    fn test_update_in_place() {
        let log = AlertLog::default();
        let r = record("a");
        let id = r.id;
        log.push(r);

        let updated = log
            .update(id, |r| {
                r.status = AlertStatus::Dispatched;
                r.retry_count = 2;
            })
            .unwrap();
        assert!(updated.dispatched());
        assert_eq!(log.get(id).unwrap().retry_count, 2);
        assert!(log.update(Uuid::new_v4(), |_| {}).is_none());
    }
}
