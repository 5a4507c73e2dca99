//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, timeout within interval)
//! - Resolve target entries into fully specified `Target` records
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - A config with any invalid target yields no targets at all

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::{CheckKind, MonitorConfig, NotifierKind, TargetConfig};
use crate::target::{CheckSpec, HttpCheck, Target};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check the whole configuration.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    resolve_targets(config).map(|_| ())
}

/// Validate `config` and build the target set it describes. Disabled
/// targets are validated but not returned.
pub fn resolve_targets(config: &MonitorConfig) -> Result<Vec<Target>, Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_globals(config, &mut errors);

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (i, entry) in config.targets.iter().enumerate() {
        let field = if entry.name.trim().is_empty() {
            format!("targets[{}]", i)
        } else {
            format!("targets.{}", entry.name)
        };
        if !entry.name.trim().is_empty() && !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::new(&field, "duplicate target name"));
            continue;
        }
        match resolve_target(config, entry, &field) {
            Ok(target) if entry.enabled => targets.push(target),
            Ok(_) => {}
            Err(mut errs) => errors.append(&mut errs),
        }
    }

    check_notifiers(config, &mut errors);

    if errors.is_empty() {
        Ok(targets)
    } else {
        Err(errors)
    }
}

fn check_globals(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let s = &config.scheduler;
    if s.max_in_flight == 0 {
        errors.push(ValidationError::new("scheduler.max_in_flight", "must be at least 1"));
    }
    if s.history_capacity == 0 {
        errors.push(ValidationError::new("scheduler.history_capacity", "must be at least 1"));
    }

    let a = &config.alerts;
    if a.workers == 0 {
        errors.push(ValidationError::new("alerts.workers", "must be at least 1"));
    }
    if a.queue_size == 0 {
        errors.push(ValidationError::new("alerts.queue_size", "must be at least 1"));
    }
    if a.base_delay_ms > a.max_delay_ms {
        errors.push(ValidationError::new(
            "alerts.base_delay_ms",
            "must not exceed alerts.max_delay_ms",
        ));
    }

    let d = &config.defaults;
    if d.interval_secs == 0 {
        errors.push(ValidationError::new("defaults.interval_secs", "must be greater than zero"));
    }
    if let Err(message) = seconds(d.timeout_secs) {
        errors.push(ValidationError::new("defaults.timeout_secs", message));
    }

    if config.dashboard.enabled && config.dashboard.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "dashboard.bind_address",
            format!("'{}' is not a socket address", config.dashboard.bind_address),
        ));
    }

    let o = &config.observability;
    if !LOG_LEVELS.contains(&o.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if o.metrics_enabled && o.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", o.metrics_address),
        ));
    }
}

fn resolve_target(
    config: &MonitorConfig,
    entry: &TargetConfig,
    field: &str,
) -> Result<Target, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let defaults = &config.defaults;

    if entry.name.trim().is_empty() {
        errors.push(ValidationError::new(field, "name must not be empty"));
    }

    let check = match entry.kind {
        CheckKind::Http => http_check(entry, field, &mut errors),
        CheckKind::Tcp => tcp_check(entry, field, &mut errors),
    };

    let interval = Duration::from_secs(entry.interval_secs.unwrap_or(defaults.interval_secs));
    if interval.is_zero() {
        errors.push(ValidationError::new(
            format!("{}.interval_secs", field),
            "must be greater than zero",
        ));
    }

    let timeout = match seconds(entry.timeout_secs.unwrap_or(defaults.timeout_secs)) {
        Ok(timeout) => timeout,
        Err(message) => {
            errors.push(ValidationError::new(format!("{}.timeout_secs", field), message));
            Duration::ZERO
        }
    };
    if !interval.is_zero() && timeout > interval {
        errors.push(ValidationError::new(
            format!("{}.timeout_secs", field),
            "must not exceed the polling interval",
        ));
    }

    let thresholds = entry.thresholds(defaults);
    if let Some(name) = thresholds.first_zero() {
        errors.push(ValidationError::new(
            format!("{}.{}", field, name),
            "must be at least 1",
        ));
    }

    if let Some(kind) = entry.soft_errors.iter().find(|k| k.is_transport()) {
        errors.push(ValidationError::new(
            format!("{}.soft_errors", field),
            format!("{} is a transport error and cannot be soft", kind),
        ));
    }

    if entry.degraded_latency_ms == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.degraded_latency_ms", field),
            "must be greater than zero",
        ));
    }

    let (Some(check), true) = (check, errors.is_empty()) else {
        return Err(errors);
    };

    let mut target = Target::new(entry.name.clone(), check, interval, timeout)
        .with_thresholds(thresholds)
        .with_soft_errors(entry.soft_errors.clone())
        .with_alert_throttle(Duration::from_secs(
            entry.alert_throttle_secs.unwrap_or(defaults.alert_throttle_secs),
        ));
    if let Some(ms) = entry.degraded_latency_ms {
        target = target.with_degraded_latency(Duration::from_millis(ms));
    }

    target
        .check_invariants()
        .map_err(|message| vec![ValidationError::new(field, message)])?;
    Ok(target)
}

fn http_check(entry: &TargetConfig, field: &str, errors: &mut Vec<ValidationError>) -> Option<CheckSpec> {
    let url = match entry.url.as_deref().map(Url::parse) {
        None => {
            errors.push(ValidationError::new(format!("{}.url", field), "required for http targets"));
            None
        }
        Some(Err(e)) => {
            errors.push(ValidationError::new(format!("{}.url", field), e.to_string()));
            None
        }
        Some(Ok(url)) if !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::new(
                format!("{}.url", field),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
            None
        }
        Some(Ok(url)) => Some(url),
    };

    let method = entry.method.to_uppercase();
    if Method::from_bytes(method.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            format!("{}.method", field),
            format!("'{}' is not an HTTP method", entry.method),
        ));
    }

    if let Some(code) = entry.expected_status.iter().find(|c| !(100..=599).contains(*c)) {
        errors.push(ValidationError::new(
            format!("{}.expected_status", field),
            format!("{} is not an HTTP status code", code),
        ));
    }

    url.map(|url| {
        CheckSpec::Http(HttpCheck {
            url,
            method,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            expected_status: entry.expected_status.clone(),
            body_contains: entry.body_contains.clone(),
        })
    })
}

fn tcp_check(entry: &TargetConfig, field: &str, errors: &mut Vec<ValidationError>) -> Option<CheckSpec> {
    let Some(address) = entry.address.as_deref() else {
        errors.push(ValidationError::new(
            format!("{}.address", field),
            "required for tcp targets",
        ));
        return None;
    };

    let valid = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0));
    if !valid {
        errors.push(ValidationError::new(
            format!("{}.address", field),
            format!("'{}' is not host:port", address),
        ));
        return None;
    }

    Some(CheckSpec::Tcp {
        address: address.to_string(),
    })
}

fn check_notifiers(config: &MonitorConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (i, notifier) in config.notifiers.iter().enumerate() {
        if notifier.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("notifiers[{}]", i), "name must not be empty"));
            continue;
        }
        let field = format!("notifiers.{}", notifier.name);
        if !seen.insert(notifier.name.as_str()) {
            errors.push(ValidationError::new(&field, "duplicate notifier name"));
        }
        if notifier.kind == NotifierKind::Webhook {
            match notifier.url.as_deref().map(Url::parse) {
                Some(Ok(url)) if matches!(url.scheme(), "http" | "https") => {}
                Some(Ok(_)) | Some(Err(_)) => errors.push(ValidationError::new(
                    format!("{}.url", field),
                    "must be an http(s) URL",
                )),
                None => errors.push(ValidationError::new(
                    format!("{}.url", field),
                    "required for webhook notifiers",
                )),
            }
        }
    }
}

fn seconds(value: f64) -> Result<Duration, String> {
    if !value.is_finite() || value <= 0.0 {
        return Err("must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::NotifierConfig;
    use crate::health::outcome::ErrorKind;

    fn config(targets: Vec<TargetConfig>) -> MonitorConfig {
        MonitorConfig {
            targets,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn test_resolves_defaults_and_overrides() {
        let mut api = TargetConfig::http("api", "https://example.com/health");
        api.interval_secs = Some(30);
        api.timeout_secs = Some(2.5);
        api.degraded_latency_ms = Some(800);
        api.method = "post".into();
        let db = TargetConfig::tcp("db", "db.internal:5432");
        let mut off = TargetConfig::http("off", "https://example.com");
        off.enabled = false;

        let targets = resolve_targets(&config(vec![api, db, off])).unwrap();
        assert_eq!(targets.len(), 2);

        let api = &targets[0];
        assert_eq!(api.interval, Duration::from_secs(30));
        assert_eq!(api.timeout, Duration::from_millis(2500));
        assert_eq!(api.degraded_latency, Some(Duration::from_millis(800)));
        assert_eq!(api.alert_throttle, Duration::from_secs(300));
        match &api.check {
            CheckSpec::Http(http) => assert_eq!(http.method, "POST"),
            other => panic!("unexpected check {:?}", other),
        }
        assert_eq!(targets[1].check.kind(), "tcp");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut no_url = TargetConfig::http("a", "");
        no_url.url = None;
        let mut slow = TargetConfig::http("b", "ftp://example.com");
        slow.interval_secs = Some(5);
        slow.timeout_secs = Some(10.0);
        slow.failure_threshold = Some(0);
        let bad_tcp = TargetConfig::tcp("c", "localhost");
        let mut soft_timeout = TargetConfig::http("d", "https://example.com");
        soft_timeout.soft_errors = vec![ErrorKind::Timeout];
        let dup = TargetConfig::http("d", "https://example.com");

        let errors = resolve_targets(&config(vec![no_url, slow, bad_tcp, soft_timeout, dup])).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"targets.a.url"));
        assert!(fields.contains(&"targets.b.url"));
        assert!(fields.contains(&"targets.b.timeout_secs"));
        assert!(fields.contains(&"targets.b.failure_threshold"));
        assert!(fields.contains(&"targets.c.address"));
        assert!(fields.contains(&"targets.d.soft_errors"));
        assert!(fields.contains(&"targets.d"));
    }

    #[test]
    fn test_threshold_of_one_is_valid() {
        let mut api = TargetConfig::http("api", "https://example.com");
        api.failure_threshold = Some(1);
        api.recovery_threshold = Some(1);
        assert!(validate_config(&config(vec![api])).is_ok());
    }

    #[test]
    fn test_global_and_notifier_checks() {
        let mut config = config(Vec::new());
        config.scheduler.max_in_flight = 0;
        config.observability.log_level = "loud".into();
        config.notifiers.push(NotifierConfig {
            name: "hook".into(),
            kind: NotifierKind::Webhook,
            url: None,
            enabled: true,
            on_failure: true,
            on_recovery: true,
            on_degraded: true,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["scheduler.max_in_flight", "observability.log_level", "notifiers.hook.url"]
        );
    }
}
