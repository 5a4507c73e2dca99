//! OS signal handling.
//!
//! SIGINT / SIGTERM trigger graceful shutdown; SIGHUP requests a
//! configuration reload.

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;

/// What a received signal asks the process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Reload,
}

/// Listen for signals until shutdown is requested.
///
/// Reload requests are forwarded on `reload_tx`; the shutdown request
/// triggers `shutdown`.
pub async fn handle_signals(shutdown: &Shutdown, reload_tx: mpsc::UnboundedSender<()>) {
    let mut signals = Signals::install();
    loop {
        match signals.next().await {
            SignalAction::Reload => {
                tracing::info!("SIGHUP received, reloading configuration");
                let _ = reload_tx.send(());
            }
            SignalAction::Shutdown => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
                return;
            }
        }
    }
}

/// Signal listeners, installed once for the life of the loop.
#[cfg(unix)]
struct Signals {
    handlers: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => Self { handlers: Some((term, hup)) },
            _ => {
                tracing::warn!("Failed to install unix signal handlers, falling back to Ctrl+C");
                Self { handlers: None }
            }
        }
    }

    async fn next(&mut self) -> SignalAction {
        let Some((term, hup)) = self.handlers.as_mut() else {
            let _ = tokio::signal::ctrl_c().await;
            return SignalAction::Shutdown;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => SignalAction::Shutdown,
            _ = term.recv() => SignalAction::Shutdown,
            Some(()) = hup.recv() => SignalAction::Reload,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Self {
        Self
    }

    async fn next(&mut self) -> SignalAction {
        let _ = tokio::signal::ctrl_c().await;
        SignalAction::Shutdown
    }
}
