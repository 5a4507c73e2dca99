//! Monitor driven end to end against local HTTP backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_monitor::alerts::AlertKind;
use api_monitor::config::{MonitorConfig, TargetConfig};
use api_monitor::health::{ErrorKind, HealthState, HttpChecker};
use api_monitor::{Monitor, MonitorError, Shutdown};
use tokio::sync::mpsc;

mod common;
use common::{start_programmable_backend, wait_until, RecordingNotifier};

fn checker() -> Arc<HttpChecker> {
    Arc::new(HttpChecker::with_client(
        reqwest::Client::builder().no_proxy().build().unwrap(),
    ))
}

fn base_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.scheduler.max_start_jitter_ms = 0;
    config.scheduler.shutdown_grace_secs = 1;
    config.alerts.base_delay_ms = 10;
    config.alerts.max_delay_ms = 50;
    config
}

fn http_target(name: &str, url: String) -> TargetConfig {
    let mut target = TargetConfig::http(name, url);
    target.interval_secs = Some(1);
    target.timeout_secs = Some(0.5);
    target.failure_threshold = Some(2);
    target.recovery_threshold = Some(1);
    target
}

#[tokio::test]
async fn test_outage_and_recovery_alerts() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let addr = start_programmable_backend(move || {
        let up = flag.load(Ordering::SeqCst);
        async move {
            if up {
                (200, "ok".to_string())
            } else {
                (503, "maintenance".to_string())
            }
        }
    })
    .await;

    let mut config = base_config();
    config.targets.push(http_target("api", format!("http://{}/health", addr)));

    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = Arc::new(Monitor::new(config, checker(), notifier.clone()).unwrap());
    let view = monitor.view();

    let shutdown = Shutdown::new();
    let (_reload_tx, reloads) = mpsc::unbounded_channel();
    let running = {
        let monitor = monitor.clone();
        let signal = shutdown.subscribe();
        tokio::spawn(async move { monitor.run(signal, reloads).await })
    };

    assert!(wait_until(Duration::from_secs(3), || view.current_state("api") == Some(HealthState::Up)).await);

    healthy.store(false, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || view.current_state("api") == Some(HealthState::Down)).await);

    let failed = view.history("api", 1).unwrap();
    assert_eq!(failed[0].error_kind(), Some(ErrorKind::UnexpectedStatus));
    assert_eq!(failed[0].response.as_ref().unwrap().status_code, Some(503));

    healthy.store(true, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(4), || view.current_state("api") == Some(HealthState::Up)).await);

    shutdown.trigger();
    running.await.unwrap();

    let kinds: Vec<_> = notifier.delivered_for("api").iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::Down, AlertKind::Recovery]);

    let alerts = view.target_alerts("api", 10);
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.dispatched()));

    let uptime = view.uptime_ratio("api", None).unwrap();
    assert!(uptime > 0.0 && uptime < 1.0);
}

#[tokio::test]
async fn test_check_all_once() {
    let good = start_programmable_backend(|| async { (200, "ok".to_string()) }).await;
    let bad = start_programmable_backend(|| async { (500, "boom".to_string()) }).await;

    let mut config = base_config();
    config.targets.push(http_target("good", format!("http://{}/", good)));
    config.targets.push(http_target("bad", format!("http://{}/", bad)));

    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = Monitor::new(config, checker(), notifier.clone()).unwrap();

    let results = monitor.check_all_once().await.unwrap();
    assert_eq!(results.len(), 2);
    for (key, outcome) in &results {
        assert_eq!(outcome.success, key == "good", "unexpected outcome for {}", key);
    }

    let view = monitor.view();
    assert_eq!(view.current_state("good"), Some(HealthState::Up));
    assert_eq!(view.current_state("bad"), Some(HealthState::Down));

    let summary = view.summary();
    assert_eq!((summary.up, summary.down), (1, 1));

    monitor.start().await;
    assert!(matches!(monitor.check_all_once().await, Err(MonitorError::AlreadyRunning)));

    monitor.shutdown().await;
    // Unknown → Down is reported.
    assert!(wait_until(Duration::from_secs(1), || notifier.delivered_for("bad").len() == 1).await);
}

#[tokio::test]
async fn test_reload_rejects_invalid_and_applies_valid() {
    let addr = start_programmable_backend(|| async { (200, "ok".to_string()) }).await;

    let mut config = base_config();
    config.targets.push(http_target("first", format!("http://{}/a", addr)));

    let monitor = Monitor::new(config.clone(), checker(), Arc::new(RecordingNotifier::new())).unwrap();
    monitor.start().await;

    let mut invalid = config.clone();
    invalid.targets.push(http_target("broken", "not a url".to_string()));
    assert!(matches!(monitor.reload(invalid).await, Err(MonitorError::InvalidConfig(_))));
    assert_eq!(monitor.registry().load().len(), 1);

    let mut valid = config.clone();
    valid.scheduler.max_in_flight = 4;
    valid.targets.push(http_target("second", format!("http://{}/b", addr)));
    let summary = monitor.reload(valid).await.unwrap();
    assert_eq!((summary.added, summary.unchanged), (1, 1));
    assert_eq!(monitor.scheduler().max_in_flight(), 4);

    let view = monitor.view();
    assert!(wait_until(Duration::from_secs(3), || view.current_state("second") == Some(HealthState::Up)).await);

    monitor.shutdown().await;
}
