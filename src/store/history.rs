//! Fixed-capacity outcome history and derived statistics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::outcome::Outcome;

/// Chronological ring buffer of outcomes. The oldest entry is evicted
/// when a push would exceed the capacity.
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    outcomes: VecDeque<Arc<Outcome>>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, outcome: Arc<Outcome>) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Arc<Outcome>> {
        self.outcomes.back()
    }

    /// The most recent `limit` outcomes, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<Outcome>> {
        let skip = self.outcomes.len().saturating_sub(limit);
        self.outcomes.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Outcome>> {
        self.outcomes.iter()
    }

    /// Successes over total, for outcomes no older than `window` before
    /// `now`. `None` window means the whole stored history.
    pub fn uptime_ratio(&self, window: Option<Duration>, now: DateTime<Utc>) -> Option<f64> {
        let (total, ok) = self
            .in_window(window, now)
            .fold((0usize, 0usize), |(total, ok), o| (total + 1, ok + o.success as usize));
        if total == 0 {
            None
        } else {
            Some(ok as f64 / total as f64)
        }
    }

    /// Nearest-rank percentile (0-100) of successful-probe latency.
    pub fn latency_percentile(&self, percentile: f64) -> Option<Duration> {
        let mut latencies = self.success_latencies();
        percentile_of(&mut latencies, percentile)
    }

    pub fn stats(&self) -> TargetStats {
        let total = self.outcomes.len();
        let successful = self.outcomes.iter().filter(|o| o.success).count();
        let mut latencies = self.success_latencies();

        let average_latency_ms = if latencies.is_empty() {
            None
        } else {
            let sum: Duration = latencies.iter().sum();
            Some(as_millis(sum) / latencies.len() as f64)
        };

        TargetStats {
            total_checks: total,
            successful_checks: successful,
            failed_checks: total - successful,
            uptime_percentage: if total == 0 {
                None
            } else {
                Some(successful as f64 * 100.0 / total as f64)
            },
            average_latency_ms,
            p50_latency_ms: percentile_of(&mut latencies, 50.0).map(as_millis),
            p95_latency_ms: percentile_of(&mut latencies, 95.0).map(as_millis),
            p99_latency_ms: percentile_of(&mut latencies, 99.0).map(as_millis),
            last_checked: self.latest().map(|o| o.timestamp),
            last_error: self
                .outcomes
                .iter()
                .rev()
                .find_map(|o| o.error.as_ref().map(|e| e.to_string())),
        }
    }

    fn in_window(
        &self,
        window: Option<Duration>,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &Arc<Outcome>> {
        let cutoff = window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .and_then(|w| now.checked_sub_signed(w));
        self.outcomes
            .iter()
            .filter(move |o| cutoff.map_or(true, |c| o.timestamp >= c))
    }

    fn success_latencies(&self) -> Vec<Duration> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.latency)
            .collect()
    }
}

fn percentile_of(values: &mut [Duration], percentile: f64) -> Option<Duration> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let p = percentile.clamp(0.0, 100.0) / 100.0;
    let rank = (p * values.len() as f64).ceil() as usize;
    Some(values[rank.saturating_sub(1).min(values.len() - 1)])
}

fn as_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Aggregates over the stored window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStats {
    pub total_checks: usize,
    pub successful_checks: usize,
    pub failed_checks: usize,
    pub uptime_percentage: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
