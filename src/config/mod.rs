//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, resolve targets)
//!     → MonitorConfig (validated, immutable)
//!     → Vec<Target> → SharedRegistry::swap
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Monitor::reload (atomic registry swap, scheduler diff)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{example_config, load_config, write_config, ConfigError};
pub use schema::{MonitorConfig, NotifierConfig, TargetConfig};
pub use validation::{resolve_targets, validate_config, ValidationError};
pub use watcher::ConfigWatcher;
