//! Webhook channel.
//!
//! The payload shape is chosen from the webhook host: Slack attachments,
//! Discord embeds, or a flat generic JSON object.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::alerts::{AlertKind, AlertRecord};
use crate::notify::{Notifier, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookFormat {
    Slack,
    Discord,
    Generic,
}

/// Posts alert records as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    name: String,
    url: Url,
    client: Client,
}

impl WebhookNotifier {
    /// The client times out after 5 seconds so a hung endpoint costs one
    /// retry, not a stuck delivery worker.
    pub fn new(name: impl Into<String>, url: Url) -> Result<Self, NotifyError> {
        let name = name.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifyError::Unavailable {
                channel: name.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self::with_client(name, url, client))
    }

    pub fn with_client(name: impl Into<String>, url: Url, client: Client) -> Self {
        Self {
            name: name.into(),
            url,
            client,
        }
    }

    fn format(&self) -> WebhookFormat {
        match self.url.host_str() {
            Some("hooks.slack.com") => WebhookFormat::Slack,
            Some("discord.com") | Some("discordapp.com") => WebhookFormat::Discord,
            _ => WebhookFormat::Generic,
        }
    }

    fn payload(&self, alert: &AlertRecord) -> Value {
        match self.format() {
            WebhookFormat::Slack => slack_payload(alert),
            WebhookFormat::Discord => discord_payload(alert),
            WebhookFormat::Generic => generic_payload(alert),
        }
    }
}

fn color_hex(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Down => "#E74C3C",
        AlertKind::Degraded => "#E67E22",
        AlertKind::Recovery => "#2ECC71",
    }
}

fn color_decimal(kind: AlertKind) -> u32 {
    match kind {
        AlertKind::Down => 0x00_E7_4C_3C,
        AlertKind::Degraded => 0x00_E6_7E_22,
        AlertKind::Recovery => 0x00_2E_CC_71,
    }
}

fn error_text(alert: &AlertRecord) -> String {
    alert
        .transition
        .outcome
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn slack_payload(alert: &AlertRecord) -> Value {
    json!({
        "attachments": [{
            "color": color_hex(alert.kind),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": alert.summary() }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Target:*\n{}", alert.target_key) },
                        { "type": "mrkdwn", "text": format!("*State:*\n{} → {}", alert.transition.from, alert.transition.to) },
                        { "type": "mrkdwn", "text": format!("*Error:*\n{}", error_text(alert)) },
                        { "type": "mrkdwn", "text": format!("*Latency:*\n{} ms", alert.transition.outcome.latency.as_millis()) }
                    ]
                }
            ]
        }]
    })
}

fn discord_payload(alert: &AlertRecord) -> Value {
    json!({
        "username": "api-monitor",
        "embeds": [{
            "title": alert.summary(),
            "color": color_decimal(alert.kind),
            "fields": [
                { "name": "Target", "value": &alert.target_key, "inline": true },
                { "name": "State", "value": format!("{} → {}", alert.transition.from, alert.transition.to), "inline": true },
                { "name": "Error", "value": error_text(alert), "inline": false }
            ],
            "timestamp": alert.transition.at.to_rfc3339()
        }]
    })
}

fn generic_payload(alert: &AlertRecord) -> Value {
    json!({
        "source": "api-monitor",
        "id": alert.id.to_string(),
        "kind": alert.kind,
        "target": &alert.target_key,
        "from": alert.transition.from,
        "to": alert.transition.to,
        "timestamp": alert.transition.at.to_rfc3339(),
        "summary": alert.summary(),
        "outcome": &*alert.transition.outcome
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&self.payload(alert))
            .send()
            .await
            .map_err(|e| NotifyError::Unavailable {
                channel: self.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(channel = %self.name, alert_id = %alert.id, "Webhook delivered");
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                channel: self.name.clone(),
                status: status.as_u16(),
            })
        }
    }
}
