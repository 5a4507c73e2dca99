//! Global bound on concurrently executing probes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Semaphore shared by every target task.
///
/// A tick that cannot get a permit waits inside its own probe task, so
/// other targets' timers keep running.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max: AtomicUsize::new(max),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot. Returns `None` once the limiter is closed.
    pub async fn acquire(&self) -> Option<ProbePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_in_flight(now);
        Some(ProbePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Change the bound at runtime.
    ///
    /// Shrinking below the number of probes currently in flight takes
    /// effect as those probes release their permits.
    pub fn set_max(&self, max: usize) {
        let max = max.max(1);
        let previous = self.max.swap(max, Ordering::SeqCst);

        if max > previous {
            self.semaphore.add_permits(max - previous);
        } else if max < previous {
            let excess = previous - max;
            let remaining = excess - self.semaphore.forget_permits(excess);
            if remaining > 0 {
                let semaphore = self.semaphore.clone();
                tokio::spawn(async move {
                    if let Ok(permits) = semaphore.acquire_many_owned(remaining as u32).await {
                        permits.forget();
                    }
                });
            }
        }

        tracing::info!(previous, max, "Probe concurrency limit changed");
    }

    /// Wake every waiter with `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A slot held for the duration of one probe.
#[derive(Debug)]
pub struct ProbePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ProbePermit {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_in_flight(now);
    }
}
