//! Probe outcomes.
//!
//! An `Outcome` is created once by a checker and never mutated afterwards.
//! It is shared as `Arc<Outcome>` between the result store, the state
//! machine and the transitions it triggers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    UnexpectedStatus,
    ValidationFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::DnsFailure => "dns_failure",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transport-level kinds always indicate an outage and can never be
    /// configured as soft.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ConnectionRefused | ErrorKind::DnsFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified probe error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Metadata captured from a response, when one was received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// HTTP status code (absent for TCP checks).
    pub status_code: Option<u16>,
    /// Hex-encoded SHA-256 of the (possibly truncated) response body.
    pub body_digest: Option<String>,
    /// Number of body bytes read.
    pub body_bytes: usize,
}

/// The structured result of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// When the probe completed.
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Wall-clock latency, serialized as fractional milliseconds.
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub error: Option<ProbeError>,
    pub response: Option<ResponseMeta>,
}

impl Outcome {
    pub fn success(latency: Duration, response: Option<ResponseMeta>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            latency,
            error: None,
            response,
        }
    }

    pub fn failure(error: ProbeError, latency: Duration, response: Option<ResponseMeta>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            latency,
            error: Some(error),
            response,
        }
    }

    /// A probe that did not finish within `timeout`.
    pub fn timeout(timeout: Duration, message: impl Into<String>) -> Self {
        Self::failure(ProbeError::new(ErrorKind::Timeout, message), timeout, None)
    }

    /// Replace the completion timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Label used for metrics and logs: `success` or the error kind.
    pub fn result_label(&self) -> &'static str {
        match &self.error {
            None => "success",
            Some(e) => e.kind.as_str(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_label() {
        let ok = Outcome::success(Duration::from_millis(12), None);
        assert_eq!(ok.result_label(), "success");
        assert!(ok.error_kind().is_none());

        let timed_out = Outcome::timeout(Duration::from_secs(2), "no response");
        assert_eq!(timed_out.result_label(), "timeout");
        assert_eq!(timed_out.latency, Duration::from_secs(2));
        assert!(!timed_out.success);
    }

    #[test]
    fn test_latency_serialized_as_millis() {
        let outcome = Outcome::success(Duration::from_millis(250), None);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["latency_ms"].as_f64().unwrap(), 250.0);
        assert_eq!(json["success"], true);

        let back: Outcome = serde_json::from_value(json).unwrap();
        assert_eq!(back.latency, Duration::from_millis(250));
    }

    #[test]
    fn test_transport_kinds() {
        assert!(ErrorKind::Timeout.is_transport());
        assert!(ErrorKind::DnsFailure.is_transport());
        assert!(!ErrorKind::ValidationFailed.is_transport());
        assert_eq!(ErrorKind::UnexpectedStatus.to_string(), "unexpected_status");
    }
}
