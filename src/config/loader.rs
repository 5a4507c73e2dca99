//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{
    DashboardConfig, MonitorConfig, NotifierConfig, NotifierKind, TargetConfig,
};
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported config format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// On-disk representation, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

/// Parse configuration text without validating it.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<MonitorConfig, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }
}

/// Load and validate configuration from a TOML or JSON file.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content, format)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Write `config` to `path` in the format implied by its extension.
pub fn write_config(path: &Path, config: &MonitorConfig) -> Result<(), ConfigError> {
    let content = match ConfigFormat::from_path(path)? {
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
        }
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?,
    };
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A small configuration showing each target and channel kind.
pub fn example_config() -> MonitorConfig {
    let mut health = TargetConfig::http("api_health", "https://httpbin.org/status/200");
    health.interval_secs = Some(60);
    health.timeout_secs = Some(5.0);
    health.expected_status = vec![200];

    let mut slow = TargetConfig::http("api_slow", "https://httpbin.org/delay/2");
    slow.interval_secs = Some(300);
    slow.timeout_secs = Some(10.0);
    slow.degraded_latency_ms = Some(3_000);
    slow.body_contains = Some("\"url\"".to_string());
    slow.soft_errors = vec![crate::health::outcome::ErrorKind::ValidationFailed];

    let mut dns = TargetConfig::tcp("dns", "1.1.1.1:53");
    dns.interval_secs = Some(30);
    dns.timeout_secs = Some(2.0);

    MonitorConfig {
        targets: vec![health, slow, dns],
        notifiers: vec![
            NotifierConfig {
                name: "console".to_string(),
                kind: NotifierKind::Log,
                url: None,
                enabled: true,
                on_failure: true,
                on_recovery: true,
                on_degraded: true,
            },
            NotifierConfig {
                name: "slack".to_string(),
                kind: NotifierKind::Webhook,
                url: Some("https://hooks.slack.com/services/YOUR/SLACK/WEBHOOK".to_string()),
                enabled: false,
                on_failure: true,
                on_recovery: true,
                on_degraded: false,
            },
        ],
        dashboard: DashboardConfig {
            enabled: true,
            ..DashboardConfig::default()
        },
        ..MonitorConfig::default()
    }
}
