//! Alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::health::state::{HealthState, Transition};

/// Direction of a transition, used for throttling and channel filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Down,
    Degraded,
    Recovery,
}

impl AlertKind {
    pub fn from_transition(transition: &Transition) -> Self {
        match transition.to {
            HealthState::Up => AlertKind::Recovery,
            HealthState::Degraded => AlertKind::Degraded,
            HealthState::Down | HealthState::Unknown => AlertKind::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Down => "down",
            AlertKind::Degraded => "degraded",
            AlertKind::Recovery => "recovery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Queued for delivery.
    Pending,
    Dispatched,
    /// Dropped by the throttle window.
    Suppressed,
    /// Retries exhausted.
    Failed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Dispatched => "dispatched",
            AlertStatus::Suppressed => "suppressed",
            AlertStatus::Failed => "failed",
        }
    }
}

/// One alert derived from one transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub target_key: String,
    pub kind: AlertKind,
    pub transition: Transition,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub suppressed: bool,
    pub status: AlertStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl AlertRecord {
    pub fn new(transition: Transition) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_key: transition.target_key.clone(),
            kind: AlertKind::from_transition(&transition),
            transition,
            created_at: Utc::now(),
            dispatched_at: None,
            suppressed: false,
            status: AlertStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn dispatched(&self) -> bool {
        self.status == AlertStatus::Dispatched
    }

    /// One-line human readable description.
    pub fn summary(&self) -> String {
        match self.kind {
            AlertKind::Down => format!("{} is DOWN", self.target_key),
            AlertKind::Degraded => format!("{} is DEGRADED", self.target_key),
            AlertKind::Recovery => format!(
                "{} recovered ({} → UP)",
                self.target_key, self.transition.from
            ),
        }
    }
}
