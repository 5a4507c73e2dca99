//! API monitor: polling scheduler and health evaluation engine.

// Core engine
pub mod health;
pub mod scheduler;
pub mod store;
pub mod target;

// Alerting
pub mod alerts;
pub mod notify;

// Surfaces
pub mod config;
pub mod dashboard;
pub mod monitor;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::MonitorConfig;
pub use lifecycle::Shutdown;
pub use monitor::{Monitor, MonitorError, MonitorView};
