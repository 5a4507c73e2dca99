//! The per-target probe loop.
//!
//! # Responsibilities
//! - Own one target's timer, state machine and result slot
//! - Never run two probes for the same target at once
//! - Feed outcomes to the state machine in completion order

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::health::active::Checker;
use crate::health::outcome::{ErrorKind, Outcome, ProbeError};
use crate::health::state::{HealthState, StateMachine, Transition};
use crate::observability::metrics;
use crate::scheduler::limiter::ConcurrencyLimiter;
use crate::store::ResultStore;
use crate::target::Target;

/// Collaborators shared by every target task.
pub(crate) struct TaskContext {
    pub checker: Arc<dyn Checker>,
    pub store: Arc<ResultStore>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub transitions: mpsc::UnboundedSender<Transition>,
    pub grace: Duration,
}

/// Counters exposed for observability and tests.
#[derive(Debug, Default)]
pub struct TaskStats {
    missed_ticks: AtomicU64,
    probes: AtomicU64,
}

impl TaskStats {
    /// Ticks skipped because the previous probe was still running.
    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks.load(Ordering::Relaxed)
    }

    /// Outcomes processed.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }
}

/// Why a target task is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Scheduler shutdown: an in-flight probe gets the grace period, then is
    /// recorded as a timeout.
    Shutdown,
    /// The target is being replaced or removed: an unfinished probe is
    /// dropped without an outcome.
    Reconfigure,
}

/// Sender half of a task's stop channel.
pub(crate) type StopSender = watch::Sender<Option<StopMode>>;

pub(crate) fn stop_channel() -> (StopSender, watch::Receiver<Option<StopMode>>) {
    watch::channel(None)
}

pub(crate) struct TargetTask {
    ctx: Arc<TaskContext>,
    machine: StateMachine,
    stats: Arc<TaskStats>,
    start_delay: Duration,
}

impl TargetTask {
    pub fn new(
        ctx: Arc<TaskContext>,
        machine: StateMachine,
        stats: Arc<TaskStats>,
        start_delay: Duration,
    ) -> Self {
        Self {
            ctx,
            machine,
            stats,
            start_delay,
        }
    }

    /// Run until `stop` fires, then hand the state machine back so a
    /// reconfigured target keeps its health state.
    pub async fn run(mut self, mut stop: watch::Receiver<Option<StopMode>>) -> StateMachine {
        let target = self.machine.target().clone();

        tokio::select! {
            _ = stop_requested(&mut stop) => return self.machine,
            _ = time::sleep(self.start_delay) => {}
        }

        tracing::debug!(target_key = %target.key, interval = ?target.interval, "Target timer started");

        let mut ticker = time::interval(target.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<Outcome>> = None;

        let mode = loop {
            tokio::select! {
                biased;
                mode = stop_requested(&mut stop) => break mode,
                result = wait_for_probe(&mut in_flight) => {
                    in_flight = None;
                    self.process(completed(result));
                }
                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        self.record_missed_tick(&target.key);
                    } else {
                        in_flight = Some(self.spawn_probe(target.clone()));
                    }
                }
            }
        };

        if let Some(handle) = in_flight {
            match mode {
                StopMode::Shutdown => self.finish_for_shutdown(handle, &target).await,
                StopMode::Reconfigure => self.finish_for_reconfigure(handle, &target).await,
            }
        }

        tracing::debug!(target_key = %target.key, ?mode, "Target timer stopped");
        self.machine
    }

    async fn finish_for_shutdown(&mut self, mut handle: JoinHandle<Outcome>, target: &Target) {
        match time::timeout(self.ctx.grace, &mut handle).await {
            Ok(result) => {
                self.process(completed(result));
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(target_key = %target.key, "In-flight probe cancelled at shutdown");
                self.process(Outcome::timeout(
                    target.timeout,
                    "probe cancelled during shutdown",
                ));
            }
        }
    }

    /// A finished probe is still recorded; a running one is discarded so the
    /// restart cannot inject a failure the endpoint never produced.
    async fn finish_for_reconfigure(&mut self, handle: JoinHandle<Outcome>, target: &Target) {
        if handle.is_finished() {
            self.process(completed(handle.await));
        } else {
            handle.abort();
            tracing::debug!(target_key = %target.key, "In-flight probe dropped for reconfiguration");
        }
    }

    /// Probe once and process the outcome, outside any timer. The machine
    /// is handed back so later one-shot runs continue from its state.
    pub async fn probe_once(mut self) -> (Arc<Outcome>, StateMachine) {
        let target = self.machine.target().clone();
        let outcome = completed(self.spawn_probe(target).await);
        let outcome = self.process(outcome);
        (outcome, self.machine)
    }

    fn spawn_probe(&self, target: Arc<Target>) -> JoinHandle<Outcome> {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let Some(_permit) = ctx.limiter.acquire().await else {
                return Outcome::failure(
                    ProbeError::new(ErrorKind::Unknown, "probe limiter closed"),
                    Duration::ZERO,
                    None,
                );
            };
            match time::timeout(target.timeout, ctx.checker.probe(&target)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::timeout(
                    target.timeout,
                    format!("no response within {:?}", target.timeout),
                ),
            }
        })
    }

    fn record_missed_tick(&self, key: &str) {
        let missed = self.stats.missed_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_missed_tick(key);
        tracing::debug!(target_key = %key, missed, "Tick skipped, previous probe still in flight");
    }

    fn process(&mut self, outcome: Outcome) -> Arc<Outcome> {
        let key = self.machine.target().key.clone();
        let outcome = Arc::new(outcome);

        self.stats.probes.fetch_add(1, Ordering::Relaxed);
        metrics::record_probe(&key, &outcome);
        if let Some(error) = &outcome.error {
            tracing::warn!(target_key = %key, error = %error, latency = ?outcome.latency, "Probe failed");
        }

        self.ctx.store.append(&key, outcome.clone());

        if let Some(transition) = self.machine.observe(outcome.clone()) {
            metrics::record_transition(&transition);
            if transition.to == HealthState::Up {
                tracing::info!(target_key = %key, from = ?transition.from, to = ?transition.to, "Health state changed");
            } else {
                tracing::warn!(target_key = %key, from = ?transition.from, to = ?transition.to, "Health state changed");
            }
            if self.ctx.transitions.send(transition).is_err() {
                tracing::debug!(target_key = %key, "Transition dropped, alert dispatcher stopped");
            }
        }

        let snapshot = self.machine.snapshot();
        metrics::record_health(&key, snapshot.state);
        self.ctx.store.publish_health(&key, snapshot);
        outcome
    }
}

async fn stop_requested(stop: &mut watch::Receiver<Option<StopMode>>) -> StopMode {
    let requested = stop.wait_for(Option::is_some).await.map(|mode| *mode);
    match requested {
        Ok(Some(mode)) => mode,
        // Sender gone: the scheduler was dropped.
        _ => StopMode::Shutdown,
    }
}

async fn wait_for_probe(handle: &mut Option<JoinHandle<Outcome>>) -> Result<Outcome, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn completed(result: Result<Outcome, JoinError>) -> Outcome {
    result.unwrap_or_else(|e| {
        Outcome::failure(
            ProbeError::new(ErrorKind::Unknown, format!("probe task failed: {}", e)),
            Duration::ZERO,
            None,
        )
    })
}
