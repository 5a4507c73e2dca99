//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Alert delivery:
//!     → retries.rs (bounded retries around Notifier::notify)
//!     → backoff.rs (exponential delay + jitter between attempts)
//!
//! Scheduler start-up:
//!     → backoff.rs start_jitter (spread first probes)
//! ```
//!
//! # Design Decisions
//! - Every retry loop is bounded; exhaustion is reported, never fatal
//! - Jittered delays prevent thundering herds

pub mod backoff;
pub mod retries;

pub use backoff::{calculate_backoff, start_jitter};
pub use retries::{retry_with_backoff, RetryError, RetryPolicy};
