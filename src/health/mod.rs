//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Probing (active.rs):
//!     Scheduler tick
//!     → Checker::probe(target) within target.timeout
//!     → Outcome (outcome.rs), every failure classified, never raised
//!
//! State machine (state.rs):
//!     Outcome → Signal (healthy / slow / soft failure / hard failure)
//!     → evaluate(state, counters, signal) → next state
//!     → Transition when the state changed
//!
//!     UNKNOWN ─► UP ◄──► DEGRADED
//!        │       ▲ │        │
//!        └─────► DOWN ◄─────┘
//! ```
//!
//! # Design Decisions
//! - The transition function is pure; counters only depend on outcome order
//! - State transitions require consecutive like outcomes (hysteresis)
//! - Soft failures can only degrade a target that is UP

pub mod active;
pub mod outcome;
pub mod state;

pub use active::{Checker, HttpChecker};
pub use outcome::{ErrorKind, Outcome, ProbeError, ResponseMeta};
pub use state::{HealthSnapshot, HealthState, StateMachine, Transition};
