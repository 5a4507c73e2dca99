//! Monitored target definitions.
//!
//! # Data Flow
//! ```text
//! config file
//!     → config::validation (resolve defaults, reject invalid records)
//!     → Vec<Target> (fully resolved, immutable)
//!     → registry.rs TargetRegistry (unique keys)
//!     → SharedRegistry::swap (atomic replacement of the whole set)
//!     → Scheduler::apply (diff against running tasks)
//! ```
//!
//! # Design Decisions
//! - Targets are immutable during a run; a reload replaces the whole set
//! - The registry is never edited in place, only swapped
//! - Equality on `Target` drives the scheduler diff: an unchanged target
//!   keeps its timer across reloads

pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::health::outcome::ErrorKind;

pub use registry::{RegistryDiff, RegistryError, SharedRegistry, TargetRegistry};

/// What a probe does against a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSpec {
    Http(HttpCheck),
    /// Plain TCP connect check against `host:port`.
    Tcp { address: String },
}

impl CheckSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            CheckSpec::Http(_) => "http",
            CheckSpec::Tcp { .. } => "tcp",
        }
    }

    /// Human readable address of the check.
    pub fn endpoint(&self) -> String {
        match self {
            CheckSpec::Http(http) => http.url.to_string(),
            CheckSpec::Tcp { address } => address.clone(),
        }
    }
}

/// HTTP request and the predicate its response must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheck {
    pub url: Url,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Accepted status codes. Empty means any 2xx.
    pub expected_status: Vec<u16>,
    /// Substring the body must contain.
    pub body_contains: Option<String>,
}

impl HttpCheck {
    /// A plain `GET` expecting any 2xx.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            expected_status: Vec::new(),
            body_contains: None,
        }
    }

    pub fn status_accepted(&self, status: u16) -> bool {
        if self.expected_status.is_empty() {
            (200..300).contains(&status)
        } else {
            self.expected_status.contains(&status)
        }
    }
}

/// Hysteresis thresholds. All values are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Consecutive hard failures before UP/DEGRADED → DOWN.
    pub failure_threshold: u32,
    /// Consecutive soft signals before UP → DEGRADED.
    pub degraded_threshold: u32,
    /// Consecutive successes before DOWN → UP.
    pub recovery_threshold: u32,
    /// Consecutive successes before DEGRADED → UP.
    pub soft_recovery_threshold: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            degraded_threshold: 3,
            recovery_threshold: 2,
            soft_recovery_threshold: 1,
        }
    }
}

impl Thresholds {
    /// Name of the first zero-valued threshold, if any.
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("failure_threshold", self.failure_threshold),
            ("degraded_threshold", self.degraded_threshold),
            ("recovery_threshold", self.recovery_threshold),
            ("soft_recovery_threshold", self.soft_recovery_threshold),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0)
        .map(|(name, _)| name)
    }
}

/// One monitored endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Unique key (the configured name).
    pub key: String,
    pub check: CheckSpec,
    pub interval: Duration,
    pub timeout: Duration,
    pub thresholds: Thresholds,
    /// Successful probes slower than this are soft (degraded) signals.
    pub degraded_latency: Option<Duration>,
    /// Error kinds treated as soft instead of hard.
    pub soft_errors: Vec<ErrorKind>,
    /// Minimum time between repeated alerts in the same direction.
    pub alert_throttle: Duration,
}

impl Target {
    /// A target with default thresholds; used by the ad-hoc `check` command
    /// and by tests.
    pub fn new(key: impl Into<String>, check: CheckSpec, interval: Duration, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            check,
            interval,
            timeout,
            thresholds: Thresholds::default(),
            degraded_latency: None,
            soft_errors: Vec::new(),
            alert_throttle: Duration::from_secs(300),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_alert_throttle(mut self, window: Duration) -> Self {
        self.alert_throttle = window;
        self
    }

    pub fn with_degraded_latency(mut self, latency: Duration) -> Self {
        self.degraded_latency = Some(latency);
        self
    }

    pub fn with_soft_errors(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.soft_errors = kinds;
        self
    }

    /// Structural checks every admitted target must pass.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("key must not be empty".to_string());
        }
        if self.interval.is_zero() {
            return Err("interval must be greater than zero".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        if let Some(name) = self.thresholds.first_zero() {
            return Err(format!("{} must be at least 1", name));
        }
        if let Some(kind) = self.soft_errors.iter().find(|k| k.is_transport()) {
            return Err(format!("{} cannot be configured as a soft error", kind));
        }
        Ok(())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.key, self.check.kind(), self.check.endpoint())
    }
}
