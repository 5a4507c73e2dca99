//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use api_monitor::alerts::AlertRecord;
use api_monitor::health::{Checker, ErrorKind, Outcome, ProbeError};
use api_monitor::notify::{NotifyError, Notifier};
use api_monitor::target::{CheckSpec, Target};

/// Start a programmable HTTP backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// A TCP target pointing nowhere in particular; used with scripted checkers.
pub fn target(key: &str, interval: Duration, timeout: Duration) -> Target {
    Target::new(
        key,
        CheckSpec::Tcp { address: "127.0.0.1:9".into() },
        interval,
        timeout,
    )
}

pub fn ok() -> Outcome {
    Outcome::success(Duration::from_millis(5), None)
}

pub fn refused() -> Outcome {
    Outcome::failure(
        ProbeError::new(ErrorKind::ConnectionRefused, "connection refused"),
        Duration::from_millis(1),
        None,
    )
}

/// Checker that replays a per-target script of outcomes, then keeps
/// returning the fallback. Every probe sleeps for `delay`.
pub struct ScriptedChecker {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Outcome,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: ok(),
            delay,
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Outcome) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn script(self, key: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), outcomes.into());
        self
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Highest number of probes observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn probe(&self, target: &Target) -> Outcome {
        *self.calls.lock().unwrap().entry(target.key.clone()).or_default() += 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&target.key)
            .and_then(|script| script.pop_front());
        next.unwrap_or_else(|| self.fallback.clone()).at(chrono::Utc::now())
    }
}

/// Notifier that records every delivery attempt. Alerts for targets in
/// `failing` fail that many times before succeeding; alerts for targets
/// in `slow` take that long per attempt.
#[derive(Default)]
pub struct RecordingNotifier {
    failing: Mutex<HashMap<String, u32>>,
    slow: HashMap<String, Duration>,
    attempts: Mutex<Vec<(String, Instant)>>,
    delivered: Mutex<Vec<AlertRecord>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, key: &str, times: u32) -> Self {
        self.failing.lock().unwrap().insert(key.to_string(), times);
        self
    }

    pub fn slow(mut self, key: &str, delay: Duration) -> Self {
        self.slow.insert(key.to_string(), delay);
        self
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn delivered(&self) -> Vec<AlertRecord> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_for(&self, key: &str) -> Vec<AlertRecord> {
        self.delivered()
            .into_iter()
            .filter(|a| a.target_key == key)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, alert: &AlertRecord) -> Result<(), NotifyError> {
        self.attempts
            .lock()
            .unwrap()
            .push((alert.target_key.clone(), Instant::now()));

        if let Some(delay) = self.slow.get(&alert.target_key) {
            tokio::time::sleep(*delay).await;
        }

        {
            let mut failing = self.failing.lock().unwrap();
            if let Some(remaining) = failing.get_mut(&alert.target_key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(NotifyError::Unavailable {
                        channel: "recording".into(),
                        message: "injected failure".into(),
                    });
                }
            }
        }

        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
