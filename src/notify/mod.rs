//! Notification channels.
//!
//! # Data Flow
//! ```text
//! AlertDispatcher worker
//!     → NotifierSet::notify(record)
//!         → channel filter (on_failure / on_recovery / on_degraded)
//!         → LogNotifier      (structured tracing event)
//!         → WebhookNotifier  (Slack / Discord / generic JSON POST)
//! ```
//!
//! # Design Decisions
//! - Notifiers return errors; retrying is the dispatcher's job
//! - A set calls every matching channel even when one fails

pub mod log;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use url::Url;

use crate::alerts::{AlertKind, AlertRecord};
use crate::config::schema::{NotifierConfig, NotifierKind};

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel '{channel}' unavailable: {message}")]
    Unavailable { channel: String, message: String },

    #[error("channel '{channel}' rejected the alert with HTTP {status}")]
    Rejected { channel: String, status: u16 },

    #[error("{failed} of {attempted} channels failed, first: {first}")]
    Partial {
        failed: usize,
        attempted: usize,
        first: Box<NotifyError>,
    },
}

/// Delivers one alert record to an external channel.
///
/// Delivery may be retried, so implementations must tolerate receiving
/// the same record more than once.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError>;
}

/// Which alert kinds a channel wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFilter {
    pub on_failure: bool,
    pub on_recovery: bool,
    pub on_degraded: bool,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self {
            on_failure: true,
            on_recovery: true,
            on_degraded: true,
        }
    }
}

impl ChannelFilter {
    pub fn accepts(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::Down => self.on_failure,
            AlertKind::Recovery => self.on_recovery,
            AlertKind::Degraded => self.on_degraded,
        }
    }
}

struct Channel {
    notifier: Arc<dyn Notifier>,
    filter: ChannelFilter,
}

/// Fans an alert out to every channel whose filter accepts it.
#[derive(Default)]
pub struct NotifierSet {
    channels: Vec<Channel>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, notifier: Arc<dyn Notifier>, filter: ChannelFilter) -> Self {
        self.channels.push(Channel { notifier, filter });
        self
    }

    /// Build the enabled channels from configuration. With no channels
    /// configured at all, alerts go to the log.
    pub fn from_config(configs: &[NotifierConfig]) -> Result<Self, NotifyError> {
        if configs.is_empty() {
            return Ok(Self::new().with_channel(Arc::new(LogNotifier::default()), ChannelFilter::default()));
        }

        let mut set = Self::new();
        for config in configs.iter().filter(|c| c.enabled) {
            let notifier: Arc<dyn Notifier> = match config.kind {
                NotifierKind::Log => Arc::new(LogNotifier::new(&config.name)),
                NotifierKind::Webhook => {
                    let url = config
                        .url
                        .as_deref()
                        .and_then(|u| Url::parse(u).ok())
                        .ok_or_else(|| NotifyError::Unavailable {
                            channel: config.name.clone(),
                            message: "missing or invalid webhook url".to_string(),
                        })?;
                    Arc::new(WebhookNotifier::new(&config.name, url)?)
                }
            };
            let filter = ChannelFilter {
                on_failure: config.on_failure,
                on_recovery: config.on_recovery,
                on_degraded: config.on_degraded,
            };
            set = set.with_channel(notifier, filter);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.notifier.name()).collect()
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    fn name(&self) -> &str {
        "all"
    }

    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        let mut attempted = 0;
        let mut errors = Vec::new();

        for channel in self.channels.iter().filter(|c| c.filter.accepts(alert.kind)) {
            attempted += 1;
            if let Err(e) = channel.notifier.notify(alert).await {
                tracing::warn!(
                    channel = channel.notifier.name(),
                    alert_id = %alert.id,
                    error = %e,
                    "Notification failed"
                );
                errors.push(e);
            }
        }

        let failed = errors.len();
        match errors.into_iter().next() {
            None => Ok(()),
            Some(first) if attempted == 1 => Err(first),
            Some(first) => Err(NotifyError::Partial {
                failed,
                attempted,
                first: Box::new(first),
            }),
        }
    }
}
