//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler / State Machine / Alert Dispatcher produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Scheduling anomalies (missed ticks, saturation) surface here, never as errors
//! - Recording is a no-op when no metrics recorder is installed

pub mod logging;
pub mod metrics;
