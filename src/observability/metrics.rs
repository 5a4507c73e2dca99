//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monitor_probes_total` (counter): probes by target, result
//! - `monitor_probe_duration_seconds` (histogram): probe latency by target
//! - `monitor_missed_ticks_total` (counter): ticks skipped because a probe was in flight
//! - `monitor_transitions_total` (counter): health transitions by target, from, to
//! - `monitor_target_health` (gauge): 0=unknown, 1=up, 2=degraded, 3=down
//! - `monitor_probes_in_flight` (gauge): probes currently executing
//! - `monitor_alerts_total` (counter): alerts by target, final status

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::outcome::Outcome;
use crate::health::state::{HealthState, Transition};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(target: &str, outcome: &Outcome) {
    metrics::counter!(
        "monitor_probes_total",
        "target" => target.to_string(),
        "result" => outcome.result_label()
    )
    .increment(1);
    metrics::histogram!("monitor_probe_duration_seconds", "target" => target.to_string())
        .record(outcome.latency.as_secs_f64());
}

pub fn record_missed_tick(target: &str) {
    metrics::counter!("monitor_missed_ticks_total", "target" => target.to_string()).increment(1);
}

pub fn record_transition(transition: &Transition) {
    metrics::counter!(
        "monitor_transitions_total",
        "target" => transition.target_key.clone(),
        "from" => transition.from.as_str(),
        "to" => transition.to.as_str()
    )
    .increment(1);
}

pub fn record_health(target: &str, state: HealthState) {
    metrics::gauge!("monitor_target_health", "target" => target.to_string()).set(state.as_gauge());
}

pub fn record_in_flight(count: usize) {
    metrics::gauge!("monitor_probes_in_flight").set(count as f64);
}

pub fn record_alert(target: &str, status: &'static str) {
    metrics::counter!(
        "monitor_alerts_total",
        "target" => target.to_string(),
        "status" => status
    )
    .increment(1);
}
