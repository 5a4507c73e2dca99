//! Channel that writes alerts to the structured log.

use async_trait::async_trait;

use crate::alerts::{AlertKind, AlertRecord};
use crate::notify::{Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct LogNotifier {
    name: String,
}

impl LogNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let error = alert
            .transition
            .outcome
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();

        match alert.kind {
            AlertKind::Recovery => tracing::info!(
                channel = %self.name,
                alert_id = %alert.id,
                target_key = %alert.target_key,
                from = %alert.transition.from,
                to = %alert.transition.to,
                "{}",
                alert.summary()
            ),
            AlertKind::Down | AlertKind::Degraded => tracing::warn!(
                channel = %self.name,
                alert_id = %alert.id,
                target_key = %alert.target_key,
                from = %alert.transition.from,
                to = %alert.transition.to,
                error = %error,
                "{}",
                alert.summary()
            ),
        }
        Ok(())
    }
}
