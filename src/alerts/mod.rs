//! Alert dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler ──Transition──► unbounded channel ──► dispatcher task
//!                                                   → Throttle::admit
//!                                                   → AlertLog (every record)
//!                                                   → bounded queue
//!                                                       → worker pool
//!                                                           → Notifier (retry + backoff)
//!                                                           → AlertLog status update
//! ```
//!
//! # Design Decisions
//! - The scheduler only ever does a non-blocking send; notifier latency
//!   and failures cannot delay probing
//! - A single dispatcher task keeps per-target transition order for the
//!   throttle; delivery itself is parallel
//! - Exhausted retries end in `AlertStatus::Failed`, never an error upstream

pub mod dispatcher;
pub mod log;
pub mod record;
pub mod throttle;

pub use dispatcher::{AlertConfig, AlertDispatcher, AlertHandle};
pub use log::AlertLog;
pub use record::{AlertKind, AlertRecord, AlertStatus};
pub use throttle::Throttle;
