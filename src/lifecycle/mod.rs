//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build monitor → Start scheduler → Dashboard
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop ticking → Grace period for in-flight probes
//!     → Drain alert queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: scheduler first, then alert delivery
//! - Shutdown has a deadline: in-flight probes are cancelled after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
