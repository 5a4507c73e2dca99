//! Polling scheduler.
//!
//! # Data Flow
//! ```text
//! TargetRegistry ──apply()──► diff against running set
//!     added     → spawn TargetTask (jittered start)
//!     changed   → stop task, reuse its StateMachine, respawn
//!     removed   → stop task, drop result slot
//!     unchanged → untouched
//!
//! TargetTask (one per target):
//!     tick → [previous probe in flight?] → missed tick
//!          → acquire ConcurrencyLimiter permit → Checker::probe (bounded by timeout)
//!          → ResultStore::append → StateMachine::observe → Transition channel
//! ```
//!
//! # Design Decisions
//! - One lightweight task per target, each with its own stop signal
//! - The limiter is the only state shared between targets
//! - Shutdown waits `shutdown_grace` for in-flight probes, then cancels them
//!   and records timeout outcomes
//! - Reconfiguration keeps a probe that already finished and drops one still
//!   running, so a restarted timer never reports a failure nobody observed
//! - One-shot runs keep their state machines between calls

pub mod limiter;
pub mod task;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::health::active::Checker;
use crate::health::outcome::Outcome;
use crate::health::state::{StateMachine, Transition};
use crate::resilience::start_jitter;
use crate::store::ResultStore;
use crate::target::{Target, TargetRegistry};

pub use limiter::{ConcurrencyLimiter, ProbePermit};
pub use task::TaskStats;

use task::{stop_channel, StopMode, StopSender, TargetTask, TaskContext};

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_in_flight: usize,
    pub shutdown_grace: Duration,
    /// Upper bound of the random delay before a target's first probe.
    pub max_start_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 32,
            shutdown_grace: Duration::from_secs(5),
            max_start_jitter: Duration::from_secs(1),
        }
    }
}

/// Counts of what an `apply` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    pub unchanged: usize,
}

struct TaskHandle {
    stop: StopSender,
    join: JoinHandle<StateMachine>,
    stats: Arc<TaskStats>,
}

#[derive(Default)]
struct Running {
    registry: TargetRegistry,
    tasks: HashMap<String, TaskHandle>,
    /// Machines of targets probed by `run_once` and not on a timer.
    idle: HashMap<String, StateMachine>,
}

/// Carry `machine`'s state over to the latest definition of its target.
fn resume(mut machine: StateMachine, target: &Arc<Target>) -> StateMachine {
    machine.reconfigure(target.clone());
    machine
}

/// Owns one timer task per target.
pub struct Scheduler {
    ctx: Arc<TaskContext>,
    max_start_jitter: Duration,
    running: Mutex<Running>,
    stopped: AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        checker: Arc<dyn Checker>,
        store: Arc<ResultStore>,
        transitions: mpsc::UnboundedSender<Transition>,
    ) -> Self {
        let ctx = TaskContext {
            checker,
            store,
            limiter: Arc::new(ConcurrencyLimiter::new(config.max_in_flight)),
            transitions,
            grace: config.shutdown_grace,
        };
        Self {
            ctx: Arc::new(ctx),
            max_start_jitter: config.max_start_jitter,
            running: Mutex::new(Running::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Begin probing every target in `registry`.
    pub async fn start(&self, registry: &TargetRegistry) -> ApplySummary {
        self.apply(registry).await
    }

    /// Bring the running set in line with `registry`.
    ///
    /// Only added, changed and removed targets are touched; timers of
    /// unchanged targets keep running.
    pub async fn apply(&self, registry: &TargetRegistry) -> ApplySummary {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::warn!("Registry change ignored, scheduler is shut down");
            return ApplySummary::default();
        }

        let mut running = self.running.lock().await;
        let diff = running.registry.diff(registry);
        let summary = ApplySummary {
            added: diff.added.len(),
            changed: diff.changed.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
        };
        if diff.is_empty() {
            return summary;
        }

        let mut stopping = Vec::new();
        for key in diff.removed.iter().chain(diff.changed.iter().map(|t| &t.key)) {
            if let Some(handle) = running.tasks.remove(key) {
                handle.stop.send_replace(Some(StopMode::Reconfigure));
                stopping.push((key.clone(), handle.join));
            }
        }

        let (keys, joins): (Vec<_>, Vec<_>) = stopping.into_iter().unzip();
        let mut machines = HashMap::new();
        for (key, result) in keys.into_iter().zip(join_all(joins).await) {
            match result {
                Ok(machine) => {
                    machines.insert(key, machine);
                }
                Err(e) => tracing::error!(target_key = %key, error = %e, "Target task failed"),
            }
        }

        for key in &diff.removed {
            running.idle.remove(key);
            self.ctx.store.remove(key);
            tracing::info!(target_key = %key, "Target removed");
        }

        for target in &diff.changed {
            let machine = match machines.remove(&target.key) {
                Some(mut machine) => {
                    machine.reconfigure(target.clone());
                    machine
                }
                None => StateMachine::new(target.clone()),
            };
            let handle = self.spawn(machine);
            running.tasks.insert(target.key.clone(), handle);
            tracing::info!(target_key = %target.key, "Target reconfigured");
        }

        for target in &diff.added {
            self.ctx.store.register(&target.key);
            let machine = running
                .idle
                .remove(&target.key)
                .map(|machine| resume(machine, target))
                .unwrap_or_else(|| StateMachine::new(target.clone()));
            let handle = self.spawn(machine);
            running.tasks.insert(target.key.clone(), handle);
            tracing::info!(target_key = %target.key, check = %target.check.endpoint(), "Target added");
        }

        running.registry = registry.clone();
        running.idle.clear();

        tracing::info!(
            added = summary.added,
            changed = summary.changed,
            removed = summary.removed,
            unchanged = summary.unchanged,
            "Target set applied"
        );
        summary
    }

    fn spawn(&self, machine: StateMachine) -> TaskHandle {
        let (stop, stop_rx) = stop_channel();
        let stats = Arc::new(TaskStats::default());
        let task = TargetTask::new(
            self.ctx.clone(),
            machine,
            stats.clone(),
            start_jitter(self.max_start_jitter),
        );
        let join = tokio::spawn(task.run(stop_rx));
        TaskHandle { stop, join, stats }
    }

    /// Probe every target in `registry` once, bounded by the concurrency
    /// limit, and feed the outcomes through the normal pipeline.
    ///
    /// Returns `None` while timer tasks are running, since their targets
    /// already have an owner.
    pub async fn run_once(&self, registry: &TargetRegistry) -> Option<Vec<Arc<Outcome>>> {
        let mut running = self.running.lock().await;
        if !running.tasks.is_empty() || self.is_stopped() {
            return None;
        }

        let mut idle = std::mem::take(&mut running.idle);
        let probes = registry.iter().map(|target| {
            self.ctx.store.register(&target.key);
            let machine = idle
                .remove(&target.key)
                .map(|machine| resume(machine, target))
                .unwrap_or_else(|| StateMachine::new(target.clone()));
            let task = TargetTask::new(
                self.ctx.clone(),
                machine,
                Arc::new(TaskStats::default()),
                Duration::ZERO,
            );
            task.probe_once()
        });
        let (outcomes, machines): (Vec<_>, Vec<_>) = join_all(probes).await.into_iter().unzip();
        running.idle = machines
            .into_iter()
            .map(|machine| (machine.target().key.clone(), machine))
            .collect();
        Some(outcomes)
    }

    /// Stop issuing ticks, give in-flight probes the grace period, then
    /// cancel whatever is left.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut running = self.running.lock().await;
        let tasks: Vec<_> = running.tasks.drain().collect();
        tracing::info!(targets = tasks.len(), "Stopping scheduler");

        for (_, handle) in &tasks {
            handle.stop.send_replace(Some(StopMode::Shutdown));
        }
        for result in join_all(tasks.into_iter().map(|(_, handle)| handle.join)).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Target task failed during shutdown");
            }
        }

        running.registry = TargetRegistry::empty();
        running.idle.clear();
        self.ctx.limiter.close();
        tracing::info!("Scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Ticks skipped for `key` since its task was (re)started.
    pub async fn missed_ticks(&self, key: &str) -> Option<u64> {
        self.stats(key).await.map(|s| s.missed_ticks())
    }

    pub async fn stats(&self, key: &str) -> Option<Arc<TaskStats>> {
        self.running
            .lock()
            .await
            .tasks
            .get(key)
            .map(|handle| handle.stats.clone())
    }

    /// Targets currently scheduled.
    pub async fn targets(&self) -> Vec<Arc<Target>> {
        self.running.lock().await.registry.iter().cloned().collect()
    }

    /// Probes currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.ctx.limiter.in_flight()
    }

    pub fn set_max_in_flight(&self, max: usize) {
        self.ctx.limiter.set_max(max);
    }

    pub fn max_in_flight(&self) -> usize {
        self.ctx.limiter.max()
    }
}
