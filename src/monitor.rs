//! Top-level wiring of the monitoring engine.
//!
//! # Data Flow
//! ```text
//! MonitorConfig → resolve_targets → SharedRegistry
//!                                        │
//!       Checker ──► Scheduler ◄──────────┘
//!                      │ outcomes            │ transitions
//!                      ▼                     ▼
//!                 ResultStore          AlertDispatcher → Notifier
//!                      │                     │
//!                      └──► MonitorView ◄────┘  (dashboard, CLI)
//! ```

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::alerts::{AlertDispatcher, AlertHandle, AlertLog, AlertRecord};
use crate::config::schema::MonitorConfig;
use crate::config::validation::{resolve_targets, ValidationError};
use crate::health::active::{Checker, HttpChecker};
use crate::health::outcome::Outcome;
use crate::health::state::{HealthSnapshot, HealthState};
use crate::lifecycle::ShutdownSignal;
use crate::notify::{Notifier, NotifierSet, NotifyError};
use crate::scheduler::{ApplySummary, Scheduler};
use crate::store::{ResultStore, TargetStats};
use crate::target::{RegistryError, SharedRegistry, Target, TargetRegistry};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid configuration: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    InvalidConfig(Vec<ValidationError>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("targets are already being polled")]
    AlreadyRunning,
}

/// The running engine: registry, scheduler, store and alert pipeline.
///
/// Must be created inside a Tokio runtime.
pub struct Monitor {
    config: RwLock<MonitorConfig>,
    registry: SharedRegistry,
    store: Arc<ResultStore>,
    scheduler: Scheduler,
    alerts: Mutex<Option<AlertHandle>>,
    alert_log: Arc<AlertLog>,
    started_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        checker: Arc<dyn Checker>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        let targets = resolve_targets(&config).map_err(MonitorError::InvalidConfig)?;
        let registry = SharedRegistry::new(TargetRegistry::new(targets)?);
        let store = Arc::new(ResultStore::new(config.scheduler.history_capacity));

        let alerts = AlertDispatcher::spawn(
            config.alerts.to_alert_config(),
            registry.clone(),
            notifier,
        );
        let scheduler = Scheduler::new(
            config.scheduler.to_scheduler_config(),
            checker,
            store.clone(),
            alerts.sender(),
        );

        Ok(Self {
            config: RwLock::new(config),
            registry,
            store,
            scheduler,
            alert_log: alerts.log(),
            alerts: Mutex::new(Some(alerts)),
            started_at: Utc::now(),
        })
    }

    /// Build with the HTTP checker and the configured notification channels.
    pub fn from_config(config: MonitorConfig) -> Result<Self, MonitorError> {
        let checker = Arc::new(HttpChecker::new()?);
        let notifiers = Arc::new(NotifierSet::from_config(&config.notifiers)?);
        Self::new(config, checker, notifiers)
    }

    /// Start polling every registered target.
    pub async fn start(&self) -> ApplySummary {
        self.scheduler.start(&self.registry.load()).await
    }

    /// Adopt a new configuration. An invalid one is rejected and the
    /// running target set stays active.
    ///
    /// Scheduler concurrency follows the new config; history capacity and
    /// alert settings apply from the next start.
    pub async fn reload(&self, config: MonitorConfig) -> Result<ApplySummary, MonitorError> {
        let targets = resolve_targets(&config).map_err(MonitorError::InvalidConfig)?;
        let next = TargetRegistry::new(targets)?;

        if config.scheduler.max_in_flight != self.scheduler.max_in_flight() {
            self.scheduler.set_max_in_flight(config.scheduler.max_in_flight);
        }
        let summary = self.apply_registry(next).await;
        *self.config.write().expect("config lock poisoned") = config;
        Ok(summary)
    }

    /// Swap in `registry` and restart only what changed.
    pub async fn apply_registry(&self, registry: TargetRegistry) -> ApplySummary {
        self.registry.swap(registry);
        self.scheduler.apply(&self.registry.load()).await
    }

    /// Probe every target once and feed the results through the pipeline.
    pub async fn check_all_once(&self) -> Result<Vec<(String, Arc<Outcome>)>, MonitorError> {
        let registry = self.registry.load();
        let outcomes = self
            .scheduler
            .run_once(&registry)
            .await
            .ok_or(MonitorError::AlreadyRunning)?;
        Ok(registry.keys().cloned().zip(outcomes).collect())
    }

    /// Run until `shutdown` fires, applying configurations from `reloads`.
    pub async fn run(
        &self,
        mut shutdown: ShutdownSignal,
        mut reloads: mpsc::UnboundedReceiver<MonitorConfig>,
    ) {
        let summary = self.start().await;
        tracing::info!(targets = summary.added, "Monitor running");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(config) = reloads.recv() => match self.reload(config).await {
                    Ok(summary) => tracing::info!(
                        added = summary.added,
                        changed = summary.changed,
                        removed = summary.removed,
                        "Configuration reloaded"
                    ),
                    Err(e) => tracing::error!(error = %e, "Reload rejected, keeping current targets"),
                },
            }
        }

        self.shutdown().await;
    }

    /// Stop the scheduler, then drain the alert pipeline.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let alerts = self.alerts.lock().expect("alert handle lock poisoned").take();
        if let Some(alerts) = alerts {
            alerts.shutdown().await;
        }
        tracing::info!("Monitor stopped");
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Read-only query surface.
    pub fn view(&self) -> MonitorView {
        MonitorView {
            registry: self.registry.clone(),
            store: self.store.clone(),
            alerts: self.alert_log.clone(),
            started_at: self.started_at,
        }
    }
}

/// Row of the target listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub key: String,
    pub kind: &'static str,
    pub endpoint: String,
    pub interval_secs: f64,
    pub state: HealthState,
    pub since: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<f64>,
    pub uptime_percentage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub status: OverallStatus,
    pub total_targets: usize,
    pub up: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

/// Snapshot reads over the registry, result store and alert log.
/// Nothing here blocks the scheduler.
#[derive(Debug, Clone)]
pub struct MonitorView {
    registry: SharedRegistry,
    store: Arc<ResultStore>,
    alerts: Arc<AlertLog>,
    started_at: DateTime<Utc>,
}

impl MonitorView {
    pub fn new(registry: SharedRegistry, store: Arc<ResultStore>, alerts: Arc<AlertLog>) -> Self {
        Self {
            registry,
            store,
            alerts,
            started_at: Utc::now(),
        }
    }

    pub fn list_targets(&self) -> Vec<TargetSummary> {
        self.registry
            .load()
            .iter()
            .map(|target| self.summarize(target))
            .collect()
    }

    pub fn target(&self, key: &str) -> Option<TargetSummary> {
        self.registry.load().get(key).map(|t| self.summarize(t))
    }

    fn summarize(&self, target: &Target) -> TargetSummary {
        let health = self.store.health(&target.key).unwrap_or_default();
        let history = self.store.snapshot(&target.key);
        let latest = history.as_ref().and_then(|h| h.latest().cloned());
        TargetSummary {
            key: target.key.clone(),
            kind: target.check.kind(),
            endpoint: target.check.endpoint(),
            interval_secs: target.interval.as_secs_f64(),
            state: health.state,
            since: health.since,
            last_checked: health.last_checked,
            last_latency_ms: latest.map(|o| o.latency.as_secs_f64() * 1000.0),
            uptime_percentage: history
                .and_then(|h| h.uptime_ratio(None, Utc::now()))
                .map(|r| r * 100.0),
        }
    }

    /// `None` for unregistered targets.
    pub fn current_state(&self, key: &str) -> Option<HealthState> {
        if !self.registry.load().contains(key) {
            return None;
        }
        Some(self.store.state(key).unwrap_or_default())
    }

    pub fn health(&self, key: &str) -> Option<HealthSnapshot> {
        self.store.health(key)
    }

    /// Most recent `limit` outcomes, oldest first.
    pub fn history(&self, key: &str, limit: usize) -> Option<Vec<Arc<Outcome>>> {
        self.store.recent(key, limit)
    }

    /// Successes over total within `window` (whole stored history when
    /// `None`). `None` when the target is unknown or has no outcomes in range.
    pub fn uptime_ratio(&self, key: &str, window: Option<Duration>) -> Option<f64> {
        self.store.uptime_ratio(key, window)
    }

    pub fn stats(&self, key: &str) -> Option<TargetStats> {
        self.store.stats(key)
    }

    pub fn summary(&self) -> HealthSummary {
        let registry = self.registry.load();
        let (mut up, mut degraded, mut down, mut unknown) = (0, 0, 0, 0);
        for key in registry.keys() {
            match self.store.state(key).unwrap_or_default() {
                HealthState::Up => up += 1,
                HealthState::Degraded => degraded += 1,
                HealthState::Down => down += 1,
                HealthState::Unknown => unknown += 1,
            }
        }

        let status = if down > 0 {
            OverallStatus::Unhealthy
        } else if degraded > 0 {
            OverallStatus::Degraded
        } else if up > 0 {
            OverallStatus::Healthy
        } else {
            OverallStatus::Unknown
        };

        HealthSummary {
            status,
            total_targets: registry.len(),
            up,
            degraded,
            down,
            unknown,
            started_at: self.started_at,
            generated_at: Utc::now(),
        }
    }

    /// Newest first.
    pub fn alerts(&self, limit: usize) -> Vec<AlertRecord> {
        self.alerts.recent(limit)
    }

    pub fn target_alerts(&self, key: &str, limit: usize) -> Vec<AlertRecord> {
        self.alerts.for_target(key, limit)
    }

    pub fn alert(&self, id: Uuid) -> Option<AlertRecord> {
        self.alerts.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStatus;
    use crate::config::schema::TargetConfig;
    use crate::health::outcome::{ErrorKind, ProbeError};
    use async_trait::async_trait;

    /// Healthy unless the target key starts with "down".
    struct KeyedChecker;

    #[async_trait]
    impl Checker for KeyedChecker {
        async fn probe(&self, target: &Target) -> Outcome {
            if target.key.starts_with("down") {
                Outcome::failure(
                    ProbeError::new(ErrorKind::ConnectionRefused, "refused"),
                    Duration::from_millis(1),
                    None,
                )
            } else {
                Outcome::success(Duration::from_millis(1), None)
            }
        }
    }

    fn config(names: &[&str]) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.scheduler.max_start_jitter_ms = 0;
        config.targets = names
            .iter()
            .map(|n| TargetConfig::tcp(*n, "127.0.0.1:9"))
            .collect();
        config
    }

    fn monitor(config: MonitorConfig) -> Monitor {
        Monitor::new(config, Arc::new(KeyedChecker), Arc::new(NotifierSet::new())).unwrap()
    }

    #[tokio::test]
    async fn test_check_all_once_and_summary() {
        let monitor = monitor(config(&["api", "down-db"]));
        let view = monitor.view();
        assert_eq!(view.summary().status, OverallStatus::Unknown);

        let results = monitor.check_all_once().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "api");
        assert!(results[0].1.success);

        assert_eq!(view.current_state("api"), Some(HealthState::Up));
        assert_eq!(view.current_state("down-db"), Some(HealthState::Down));
        assert_eq!(view.current_state("missing"), None);

        let summary = view.summary();
        assert_eq!(summary.status, OverallStatus::Unhealthy);
        assert_eq!((summary.up, summary.down), (1, 1));

        assert_eq!(view.history("api", 10).unwrap().len(), 1);
        assert_eq!(view.uptime_ratio("down-db", None), Some(0.0));
        assert_eq!(view.list_targets()[1].uptime_percentage, Some(0.0));

        monitor.shutdown().await;
        let alerts = view.alerts(10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].target_key, "down-db");
        assert_eq!(alerts[0].status, AlertStatus::Dispatched);
        assert_eq!(view.alert(alerts[0].id).unwrap().id, alerts[0].id);
    }

    #[tokio::test]
    async fn test_repeated_check_all_once_alerts_once() {
        let monitor = monitor(config(&["down-db"]));
        let view = monitor.view();

        monitor.check_all_once().await.unwrap();
        monitor.check_all_once().await.unwrap();
        assert_eq!(view.history("down-db", 10).unwrap().len(), 2);
        assert_eq!(view.current_state("down-db"), Some(HealthState::Down));

        monitor.shutdown().await;
        assert_eq!(view.alerts(10).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_targets() {
        let monitor = monitor(config(&["api"]));
        monitor.start().await;

        let mut bad = config(&["api", "web"]);
        bad.targets[1].address = None;
        assert!(matches!(
            monitor.reload(bad).await,
            Err(MonitorError::InvalidConfig(_))
        ));
        assert_eq!(monitor.view().list_targets().len(), 1);

        let summary = monitor.reload(config(&["api", "web"])).await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(monitor.config().targets.len(), 2);
        assert!(matches!(
            monitor.check_all_once().await,
            Err(MonitorError::AlreadyRunning)
        ));

        monitor.shutdown().await;
    }
}
