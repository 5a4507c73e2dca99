//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML or JSON
//! files. Every section has defaults so a file listing only targets works.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::AlertConfig;
use crate::health::outcome::ErrorKind;
use crate::resilience::RetryPolicy;
use crate::scheduler::SchedulerConfig;
use crate::target::Thresholds;

/// Root configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probe scheduling and result retention.
    pub scheduler: SchedulerSettings,

    /// Alert dispatch and delivery.
    pub alerts: AlertSettings,

    /// Values applied to targets that do not set their own.
    pub defaults: TargetDefaults,

    /// Monitored targets.
    pub targets: Vec<TargetConfig>,

    /// Notification channels.
    pub notifiers: Vec<NotifierConfig>,

    /// Read-only JSON dashboard.
    pub dashboard: DashboardConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Maximum probes executing at once across all targets.
    pub max_in_flight: usize,

    /// Time in-flight probes get to finish on shutdown.
    pub shutdown_grace_secs: u64,

    /// Upper bound of the random delay before a target's first probe.
    pub max_start_jitter_ms: u64,

    /// Outcomes kept per target.
    pub history_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 32,
            shutdown_grace_secs: 5,
            max_start_jitter_ms: 1_000,
            history_capacity: 100,
        }
    }
}

impl SchedulerSettings {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_in_flight: self.max_in_flight,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            max_start_jitter: Duration::from_millis(self.max_start_jitter_ms),
        }
    }
}

/// `[alerts]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Delivery workers.
    pub workers: usize,

    /// Admitted alerts waiting for a worker.
    pub queue_size: usize,

    /// Retries after the first delivery attempt.
    pub max_retries: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    /// Alert records kept for the query surface.
    pub log_capacity: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 256,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            log_capacity: 500,
        }
    }
}

impl AlertSettings {
    pub fn to_alert_config(&self) -> AlertConfig {
        AlertConfig {
            workers: self.workers,
            queue_size: self.queue_size,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
            log_capacity: self.log_capacity,
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetDefaults {
    pub interval_secs: u64,
    pub timeout_secs: f64,
    pub failure_threshold: u32,
    pub degraded_threshold: u32,
    /// Consecutive successes needed to leave DOWN.
    pub recovery_threshold: u32,
    /// Consecutive successes needed to leave DEGRADED.
    pub soft_recovery_threshold: u32,
    pub alert_throttle_secs: u64,
}

impl Default for TargetDefaults {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            interval_secs: 60,
            timeout_secs: 10.0,
            failure_threshold: thresholds.failure_threshold,
            degraded_threshold: thresholds.degraded_threshold,
            recovery_threshold: thresholds.recovery_threshold,
            soft_recovery_threshold: thresholds.soft_recovery_threshold,
            alert_throttle_secs: 300,
        }
    }
}

/// Probe protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    #[default]
    Http,
    Tcp,
}

/// One `[[targets]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Unique target key.
    pub name: String,

    #[serde(default)]
    pub kind: CheckKind,

    /// Required for `http` targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// `host:port`, required for `tcp` targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Accepted status codes. Empty accepts any 2xx.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_status: Vec<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    /// Successful probes slower than this count as degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_latency_ms: Option<u64>,

    /// Error kinds treated as degraded rather than down.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft_errors: Vec<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_recovery_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_throttle_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TargetConfig {
    /// An enabled HTTP target with every optional field unset.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CheckKind::Http,
            url: Some(url.into()),
            address: None,
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            expected_status: Vec::new(),
            body_contains: None,
            interval_secs: None,
            timeout_secs: None,
            degraded_latency_ms: None,
            soft_errors: Vec::new(),
            failure_threshold: None,
            degraded_threshold: None,
            recovery_threshold: None,
            soft_recovery_threshold: None,
            alert_throttle_secs: None,
            enabled: true,
        }
    }

    /// An enabled TCP target.
    pub fn tcp(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Tcp,
            url: None,
            address: Some(address.into()),
            ..Self::http(name, String::new())
        }
    }

    /// Thresholds with per-target overrides applied over `defaults`.
    pub fn thresholds(&self, defaults: &TargetDefaults) -> Thresholds {
        Thresholds {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            degraded_threshold: self.degraded_threshold.unwrap_or(defaults.degraded_threshold),
            recovery_threshold: self.recovery_threshold.unwrap_or(defaults.recovery_threshold),
            soft_recovery_threshold: self
                .soft_recovery_threshold
                .unwrap_or(defaults.soft_recovery_threshold),
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

/// Notification channel type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

/// One `[[notifiers]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotifierConfig {
    pub name: String,

    #[serde(default)]
    pub kind: NotifierKind,

    /// Required for `webhook` channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub on_failure: bool,

    #[serde(default = "default_true")]
    pub on_recovery: bool,

    #[serde(default = "default_true")]
    pub on_degraded: bool,
}

/// Dashboard configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Enable the JSON dashboard.
    pub enabled: bool,

    /// Dashboard bind address.
    pub bind_address: String,

    /// Optional bearer token required on every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8080".to_string(),
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [[targets]]
            name = "api"
            url = "https://example.com/health"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler, SchedulerSettings::default());
        assert_eq!(config.targets.len(), 1);
        let target = &config.targets[0];
        assert_eq!(target.kind, CheckKind::Http);
        assert_eq!(target.method, "GET");
        assert!(target.enabled);
        assert_eq!(target.thresholds(&config.defaults), Thresholds::default());
    }

    #[test]
    fn test_overrides_and_enums() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [defaults]
            failure_threshold = 5

            [[targets]]
            name = "db"
            kind = "tcp"
            address = "127.0.0.1:5432"
            recovery_threshold = 4
            soft_errors = ["validation_failed"]

            [[notifiers]]
            name = "ops"
            kind = "webhook"
            url = "https://hooks.slack.com/services/x"
            on_recovery = false
            "#,
        )
        .unwrap();

        let target = &config.targets[0];
        assert_eq!(target.kind, CheckKind::Tcp);
        assert_eq!(target.soft_errors, vec![ErrorKind::ValidationFailed]);
        let thresholds = target.thresholds(&config.defaults);
        assert_eq!(thresholds.failure_threshold, 5);
        assert_eq!(thresholds.recovery_threshold, 4);

        let notifier = &config.notifiers[0];
        assert_eq!(notifier.kind, NotifierKind::Webhook);
        assert!(notifier.on_failure);
        assert!(!notifier.on_recovery);
    }

    #[test]
    fn test_unknown_soft_error_is_a_parse_error() {
        let result: Result<MonitorConfig, _> = toml::from_str(
            r#"
            [[targets]]
            name = "api"
            url = "https://example.com"
            soft_errors = ["slow_ish"]
            "#,
        );
        assert!(result.is_err());
    }
}
