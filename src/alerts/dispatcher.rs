//! Alert dispatch pipeline.
//!
//! # Responsibilities
//! - Turn transitions into alert records, in per-target order
//! - Apply the throttle window
//! - Deliver admitted alerts from a small worker pool with bounded retries

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::alerts::log::AlertLog;
use crate::alerts::record::{AlertRecord, AlertStatus};
use crate::alerts::throttle::Throttle;
use crate::health::state::Transition;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::notify::Notifier;
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryError, RetryPolicy};
use crate::target::SharedRegistry;

/// Throttle window used when a transition's target is no longer registered.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub workers: usize,
    /// Admitted alerts waiting for a worker.
    pub queue_size: usize,
    pub retry: RetryPolicy,
    pub log_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 256,
            retry: RetryPolicy::default(),
            log_capacity: crate::alerts::log::DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Entry point for starting the pipeline.
pub struct AlertDispatcher;

impl AlertDispatcher {
    /// Spawn the dispatcher task and `config.workers` delivery workers.
    pub fn spawn(
        config: AlertConfig,
        registry: SharedRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> AlertHandle {
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size.max(1));
        let log = Arc::new(AlertLog::new(config.log_capacity));
        let shutdown = Shutdown::new();

        let dispatcher = tokio::spawn(run_dispatcher(
            transitions_rx,
            queue_tx,
            log.clone(),
            registry,
            shutdown.subscribe(),
        ));

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    queue_rx.clone(),
                    log.clone(),
                    notifier.clone(),
                    config.retry,
                ))
            })
            .collect();

        tracing::info!(workers = config.workers.max(1), "Alert dispatcher started");

        AlertHandle {
            transitions: transitions_tx,
            log,
            shutdown,
            dispatcher,
            workers,
        }
    }
}

/// Running pipeline.
pub struct AlertHandle {
    transitions: mpsc::UnboundedSender<Transition>,
    log: Arc<AlertLog>,
    shutdown: Shutdown,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl AlertHandle {
    /// Sender the scheduler reports transitions on. Sending never blocks.
    pub fn sender(&self) -> mpsc::UnboundedSender<Transition> {
        self.transitions.clone()
    }

    pub fn log(&self) -> Arc<AlertLog> {
        self.log.clone()
    }

    /// Stop accepting transitions, finish what is queued, then return.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        drop(self.transitions);

        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "Alert dispatcher task failed");
        }
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Alert worker failed");
            }
        }
        tracing::info!("Alert dispatcher stopped");
    }
}

async fn run_dispatcher(
    mut transitions: mpsc::UnboundedReceiver<Transition>,
    queue: mpsc::Sender<AlertRecord>,
    log: Arc<AlertLog>,
    registry: SharedRegistry,
    mut stop: ShutdownSignal,
) {
    let mut throttle = Throttle::new();
    let mut closing = false;

    loop {
        let transition = tokio::select! {
            next = transitions.recv() => match next {
                Some(transition) => transition,
                None => break,
            },
            _ = stop.recv(), if !closing => {
                closing = true;
                transitions.close();
                continue;
            }
        };

        let window = registry
            .load()
            .get(&transition.target_key)
            .map(|t| t.alert_throttle)
            .unwrap_or(DEFAULT_THROTTLE_WINDOW);

        let mut record = AlertRecord::new(transition);
        let admitted = throttle.admit(&record.target_key, record.kind, record.transition.at, window);

        if !admitted {
            record.suppressed = true;
            record.status = AlertStatus::Suppressed;
            tracing::info!(
                target_key = %record.target_key,
                kind = record.kind.as_str(),
                window = ?window,
                "Alert suppressed by throttle window"
            );
            metrics::record_alert(&record.target_key, AlertStatus::Suppressed.as_str());
            log.push(record);
            continue;
        }

        log.push(record.clone());
        if queue.send(record).await.is_err() {
            tracing::error!("Alert queue closed, delivery workers gone");
            break;
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<AlertRecord>>>,
    log: Arc<AlertLog>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };
        deliver(&record, notifier.as_ref(), &log, &policy).await;
    }
    tracing::debug!(worker = id, "Alert worker stopped");
}

/// Deliver one record, retrying with backoff, and record the result.
pub async fn deliver(
    record: &AlertRecord,
    notifier: &dyn Notifier,
    log: &AlertLog,
    policy: &RetryPolicy,
) -> AlertStatus {
    let result = retry_with_backoff(policy, |_| notifier.notify(record)).await;

    match result {
        Ok(((), retries)) => {
            log.update(record.id, |r| {
                r.status = AlertStatus::Dispatched;
                r.dispatched_at = Some(Utc::now());
                r.retry_count = retries;
                r.last_error = None;
            });
            tracing::info!(
                target_key = %record.target_key,
                alert_id = %record.id,
                kind = record.kind.as_str(),
                retries,
                "Alert dispatched"
            );
            metrics::record_alert(&record.target_key, AlertStatus::Dispatched.as_str());
            AlertStatus::Dispatched
        }
        Err(RetryError { error, retries }) => {
            log.update(record.id, |r| {
                r.status = AlertStatus::Failed;
                r.retry_count = retries;
                r.last_error = Some(error.to_string());
            });
            tracing::error!(
                target_key = %record.target_key,
                alert_id = %record.id,
                retries,
                error = %error,
                "Alert delivery failed, giving up"
            );
            metrics::record_alert(&record.target_key, AlertStatus::Failed.as_str());
            AlertStatus::Failed
        }
    }
}
