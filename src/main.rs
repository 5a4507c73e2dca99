//! API monitor daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──► ConfigWatcher ──┐            SIGHUP ──┐
//!                                   ▼                     ▼
//!                  ┌──────────────────────────────────────────────┐
//!                  │                   Monitor                    │
//!                  │                                              │
//!                  │  SharedRegistry ──► Scheduler ──► Checker ───┼──► monitored
//!                  │                        │     (per-target     │    endpoints
//!                  │                        │      timer tasks)    │
//!                  │            ┌───────────┴──────────┐           │
//!                  │            ▼                      ▼           │
//!                  │       ResultStore          AlertDispatcher ───┼──► log / webhook
//!                  │            │                      │           │
//!                  │            └──────► MonitorView ◄─┘           │
//!                  └─────────────────────────┬────────────────────┘
//!                                            ▼
//!                                  dashboard (axum JSON)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use api_monitor::config::{example_config, load_config, write_config, ConfigWatcher};
use api_monitor::dashboard::{serve, setup_dashboard_router};
use api_monitor::health::active::quick_check;
use api_monitor::health::HttpChecker;
use api_monitor::lifecycle::signals::handle_signals;
use api_monitor::observability::{logging::init_logging, metrics::init_metrics};
use api_monitor::{Monitor, MonitorConfig, Shutdown};

#[derive(Parser)]
#[command(name = "api-monitor")]
#[command(about = "Polls HTTP and TCP targets, tracks their health and raises alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until interrupted
    Run {
        #[arg(short, long, default_value = "monitor.toml")]
        config: PathBuf,

        /// Do not reload the configuration when the file changes
        #[arg(long)]
        no_watch: bool,
    },
    /// Probe every configured target once and exit
    Once {
        #[arg(short, long, default_value = "monitor.toml")]
        config: PathBuf,
    },
    /// Probe a single URL
    Check {
        url: url::Url,

        #[arg(short, long, default_value_t = 10.0)]
        timeout: f64,
    },
    /// Write an example configuration file
    Init {
        #[arg(default_value = "monitor.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, no_watch } => run(config, no_watch).await,
        Commands::Once { config } => once(config).await,
        Commands::Check { url, timeout } => check(url, timeout).await,
        Commands::Init { path, force } => {
            if path.exists() && !force {
                eprintln!("{} already exists, use --force to overwrite", path.display());
                return Ok(ExitCode::FAILURE);
            }
            write_config(&path, &example_config())?;
            println!("Example configuration written to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_observability(config: &MonitorConfig) {
    init_logging(&config.observability.log_level);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

async fn run(path: PathBuf, no_watch: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    init_observability(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        targets = config.targets.len(),
        max_in_flight = config.scheduler.max_in_flight,
        "api-monitor starting"
    );

    let monitor = Arc::new(Monitor::from_config(config.clone())?);
    let shutdown = Arc::new(Shutdown::new());

    let (watcher, reloads) = ConfigWatcher::new(&path);
    let _watch_guard = if no_watch {
        None
    } else {
        match watcher.clone().run() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, file changes will be ignored");
                None
            }
        }
    };

    let (hup_tx, mut hup_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while hup_rx.recv().await.is_some() {
            watcher.reload_now();
        }
    });
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { handle_signals(&shutdown, hup_tx).await });
    }

    let dashboard = if config.dashboard.enabled {
        let addr = config.dashboard.bind_address.parse()?;
        let router = setup_dashboard_router(monitor.view(), config.dashboard.api_key.clone());
        let signal = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = serve(addr, router, signal).await {
                tracing::error!(error = %e, "Dashboard server failed");
            }
        }))
    } else {
        None
    };

    monitor.run(shutdown.subscribe(), reloads).await;

    if let Some(dashboard) = dashboard {
        let _ = dashboard.await;
    }
    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn once(path: PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    init_observability(&config);

    let monitor = Monitor::from_config(config)?;
    let results = monitor.check_all_once().await?;
    let view = monitor.view();

    let mut healthy = true;
    for (key, outcome) in &results {
        let state = view.current_state(key).unwrap_or_default().as_str();
        healthy &= outcome.success;
        match &outcome.error {
            None => println!("{:<24} {:<9} {:>8.1} ms", key, state, outcome.latency.as_secs_f64() * 1000.0),
            Some(error) => println!("{:<24} {:<9} {}", key, state, error),
        }
    }

    let summary = view.summary();
    println!(
        "\n{} targets: {} up, {} degraded, {} down",
        summary.total_targets, summary.up, summary.degraded, summary.down
    );

    monitor.shutdown().await;
    Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn check(url: url::Url, timeout: f64) -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_logging("warn");

    let timeout = Duration::try_from_secs_f64(timeout)?;
    let checker = HttpChecker::new()?;
    let outcome = quick_check(&checker, url, timeout).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
