//! Structured logging.
//!
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the default filter directive for `level`.
pub fn default_directive(level: &str) -> String {
    format!("api_monitor={},monitor_cli={},tower_http=info", level, level)
}

/// Install the global tracing subscriber.
///
/// Calling this twice is harmless; the second attempt is ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("debug"),
            "api_monitor=debug,monitor_cli=debug,tower_http=info"
        );
        assert!(EnvFilter::try_new(default_directive("info")).is_ok());
    }
}
