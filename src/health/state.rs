//! Target health state machine.
//!
//! # States
//! - Unknown: no outcome observed yet
//! - Up: target answers correctly
//! - Degraded: target answers, but slowly or with soft failures
//! - Down: target is failing hard
//!
//! # State Transitions
//! ```text
//! Unknown  → Up:       first success (baseline, no Transition emitted)
//! Unknown  → Down:     first failure
//! Up       → Down:     consecutive hard failures >= failure_threshold
//! Up       → Degraded: consecutive soft signals >= degraded_threshold
//! Degraded → Up:       consecutive successes >= soft_recovery_threshold
//! Degraded → Down:     consecutive hard failures >= failure_threshold
//! Down     → Up:       consecutive successful probes (any latency) >= recovery_threshold
//! ```
//!
//! # Design Decisions
//! - `evaluate` is pure: the resulting state depends only on the ordered
//!   signal sequence, never on wall-clock arrival time
//! - Counters reset on every state change
//! - Degraded is only reachable from Up

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::outcome::Outcome;
use crate::target::{Target, Thresholds};

/// Health of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    #[default]
    Unknown,
    Up,
    Degraded,
    Down,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "UNKNOWN",
            HealthState::Up => "UP",
            HealthState::Degraded => "DEGRADED",
            HealthState::Down => "DOWN",
        }
    }

    /// Numeric encoding used by the health gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            HealthState::Unknown => 0.0,
            HealthState::Up => 1.0,
            HealthState::Degraded => 2.0,
            HealthState::Down => 3.0,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single outcome counts towards hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Successful and within the latency budget.
    Healthy,
    /// Successful, but slower than `degraded_latency`.
    Slow,
    /// Failed with an error kind configured as soft.
    SoftFailure,
    /// Failed with an outage-indicating error.
    Hard,
}

impl Signal {
    /// Classify an outcome against the target's soft-signal policy.
    pub fn classify(outcome: &Outcome, target: &Target) -> Self {
        if outcome.success {
            let slow = target
                .degraded_latency
                .is_some_and(|limit| outcome.latency > limit);
            return if slow { Signal::Slow } else { Signal::Healthy };
        }
        match outcome.error_kind() {
            Some(kind) if target.soft_errors.contains(&kind) && !kind.is_transport() => {
                Signal::SoftFailure
            }
            _ => Signal::Hard,
        }
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Signal::Slow | Signal::SoftFailure)
    }

    /// Whether the probe itself succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Signal::Healthy | Signal::Slow)
    }
}

/// Consecutive-signal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Successes within the latency budget.
    pub successes: u32,
    /// Successful probes of any latency.
    pub passing: u32,
    pub failures: u32,
    pub degraded: u32,
}

impl Counters {
    /// Counters after observing `signal`. Each kind of signal breaks the
    /// streaks of the other kinds.
    pub fn observe(self, signal: Signal) -> Self {
        match signal {
            Signal::Healthy => Self {
                successes: self.successes.saturating_add(1),
                passing: self.passing.saturating_add(1),
                failures: 0,
                degraded: 0,
            },
            Signal::Slow => Self {
                successes: 0,
                passing: self.passing.saturating_add(1),
                failures: 0,
                degraded: self.degraded.saturating_add(1),
            },
            Signal::SoftFailure => Self {
                successes: 0,
                passing: 0,
                failures: 0,
                degraded: self.degraded.saturating_add(1),
            },
            Signal::Hard => Self {
                successes: 0,
                passing: 0,
                failures: self.failures.saturating_add(1),
                degraded: 0,
            },
        }
    }
}

/// Pure transition function.
pub fn evaluate(
    state: HealthState,
    counters: Counters,
    signal: Signal,
    thresholds: &Thresholds,
) -> (HealthState, Counters) {
    let counters = counters.observe(signal);

    let next = match state {
        HealthState::Unknown => {
            if signal.is_success() {
                HealthState::Up
            } else {
                HealthState::Down
            }
        }
        HealthState::Up => {
            if counters.failures >= thresholds.failure_threshold {
                HealthState::Down
            } else if counters.degraded >= thresholds.degraded_threshold {
                HealthState::Degraded
            } else {
                HealthState::Up
            }
        }
        HealthState::Degraded => {
            if counters.failures >= thresholds.failure_threshold {
                HealthState::Down
            } else if counters.successes >= thresholds.soft_recovery_threshold {
                HealthState::Up
            } else {
                HealthState::Degraded
            }
        }
        // Slow successes still count; once UP, slowness is judged by the
        // degraded rule.
        HealthState::Down => {
            if counters.passing >= thresholds.recovery_threshold {
                HealthState::Up
            } else {
                HealthState::Down
            }
        }
    };

    if next == state {
        (next, counters)
    } else {
        (next, Counters::default())
    }
}

/// A state change worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub target_key: String,
    pub from: HealthState,
    pub to: HealthState,
    /// Timestamp of the triggering outcome.
    pub at: DateTime<Utc>,
    pub outcome: Arc<Outcome>,
}

impl Transition {
    pub fn is_recovery(&self) -> bool {
        self.to == HealthState::Up
    }
}

/// Read-only view of a target's state, published after every outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    /// When the current state was entered.
    pub since: Option<DateTime<Utc>>,
    pub counters: Counters,
    pub last_checked: Option<DateTime<Utc>>,
    /// Total probes evaluated since the machine was created.
    pub evaluations: u64,
}

/// Per-target state machine. Owned by exactly one scheduler task.
#[derive(Debug, Clone)]
pub struct StateMachine {
    key: String,
    target: Arc<Target>,
    state: HealthState,
    counters: Counters,
    since: Option<DateTime<Utc>>,
    last_checked: Option<DateTime<Utc>>,
    evaluations: u64,
}

impl StateMachine {
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            key: target.key.clone(),
            target,
            state: HealthState::Unknown,
            counters: Counters::default(),
            since: None,
            last_checked: None,
            evaluations: 0,
        }
    }

    /// Adopt a new definition of the same target, keeping state and counters.
    pub fn reconfigure(&mut self, target: Arc<Target>) {
        self.target = target;
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    /// Feed the next outcome in chronological order.
    ///
    /// Returns a `Transition` when the state changed, except for the silent
    /// Unknown → Up baseline.
    pub fn observe(&mut self, outcome: Arc<Outcome>) -> Option<Transition> {
        let signal = Signal::classify(&outcome, &self.target);
        let (next, counters) = evaluate(self.state, self.counters, signal, &self.target.thresholds);

        let previous = self.state;
        self.state = next;
        self.counters = counters;
        self.last_checked = Some(outcome.timestamp);
        self.evaluations += 1;

        if next == previous {
            return None;
        }
        self.since = Some(outcome.timestamp);

        if previous == HealthState::Unknown && next == HealthState::Up {
            tracing::debug!(target_key = %self.key, "Baseline established: UP");
            return None;
        }

        Some(Transition {
            target_key: self.key.clone(),
            from: previous,
            to: next,
            at: outcome.timestamp,
            outcome,
        })
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state,
            since: self.since,
            counters: self.counters,
            last_checked: self.last_checked,
            evaluations: self.evaluations,
        }
    }
}
